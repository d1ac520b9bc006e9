use std::io::Write;

use clock_proto::Alarm;

/// Tells the user an alarm went off
pub trait AlarmNotifier: Send + 'static {
    fn notify(&mut self, alarm: &Alarm) -> std::io::Result<()>;
}

#[derive(Debug)]
pub struct TerminalNotifier<W> {
    out: W,
    bell: bool,
}

impl<W: Write + Send + 'static> TerminalNotifier<W> {
    pub fn new(out: W, bell: bool) -> Self {
        TerminalNotifier { out, bell }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalNotifier<std::io::Stdout> {
    pub fn stdout(bell: bool) -> Self {
        Self::new(std::io::stdout(), bell)
    }
}

impl<W: Write + Send + 'static> AlarmNotifier for TerminalNotifier<W> {
    fn notify(&mut self, alarm: &Alarm) -> std::io::Result<()> {
        if self.bell {
            self.out.write_all(b"\x07")?;
        }
        writeln!(self.out, "ALARM! It is {alarm}")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rings_and_prints() {
        let mut notifier = TerminalNotifier::new(Vec::new(), true);
        notifier.notify(&Alarm::new(7, 30).unwrap()).unwrap();
        assert_eq!(notifier.into_inner(), b"\x07ALARM! It is 07:30\n");
    }

    #[test]
    fn quiet_without_bell() {
        let mut notifier = TerminalNotifier::new(Vec::new(), false);
        notifier.notify(&Alarm::new(19, 5).unwrap()).unwrap();
        assert_eq!(notifier.into_inner(), b"ALARM! It is 19:05\n");
    }
}
