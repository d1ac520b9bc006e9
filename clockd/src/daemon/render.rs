use std::io::Write;

use clock_proto::TickOutcome;

/// Displays the outcome of every tick
pub trait Renderer: Send + 'static {
    fn render(&mut self, outcome: &TickOutcome) -> std::io::Result<()>;
}

/// Prints one status line per tick
#[derive(Debug)]
pub struct TerminalRenderer<W> {
    out: W,
}

impl<W: Write + Send + 'static> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        TerminalRenderer { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> Renderer for TerminalRenderer<W> {
    fn render(&mut self, outcome: &TickOutcome) -> std::io::Result<()> {
        let angles = outcome.angles;
        write!(
            self.out,
            "{} ({}) hands: hour {:.1}, minute {:.1}, second {:.1}",
            outcome.reading.twelve_hour(),
            outcome.source,
            angles.hour,
            angles.minute,
            angles.second,
        )?;
        if outcome.alarm_ringing {
            write!(self.out, "  ALARM")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Used when the display is disabled
#[derive(Debug, Default)]
pub struct NoRenderer;

impl Renderer for NoRenderer {
    fn render(&mut self, _outcome: &TickOutcome) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clock_proto::{ClockReading, TimeSource};

    use super::*;

    fn outcome(source: TimeSource, h: i64, m: i64, s: i64, ringing: bool) -> TickOutcome {
        let reading = ClockReading::new(h, m, s).unwrap();
        TickOutcome {
            source,
            reading,
            angles: reading.angles(),
            alarm_ringing: ringing,
            fired: vec![],
        }
    }

    #[test]
    fn renders_status_line() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer
            .render(&outcome(TimeSource::LocalSimulated, 10, 15, 30, false))
            .unwrap();
        renderer
            .render(&outcome(TimeSource::UserOverride, 0, 0, 0, true))
            .unwrap();

        let out = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            [
                "10:15:30 AM (local clock) hands: hour 307.5, minute 93.0, second 180.0",
                "12:00:00 AM (user override) hands: hour 0.0, minute 0.0, second 0.0  ALARM",
            ]
        );
    }
}
