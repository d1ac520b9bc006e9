/// A command line argument after normalization: combined short flags are
/// split up and `--key=value` is turned into a key and a value.
#[derive(Debug, PartialEq, Eq)]
pub enum CliArg {
    Flag(String),
    Argument(String, String),
    Rest(Vec<String>),
}

impl CliArg {
    /// Normalize `iter`, whose first item is the binary name. Options listed
    /// in `takes_argument` (long) or `takes_argument_short` consume a value,
    /// either attached (`--config=x`, `-cx`) or as the next argument.
    /// Positional arguments, and everything after `--`, end up in a single
    /// trailing `Rest`.
    pub fn normalize_arguments<I>(
        takes_argument: &[&str],
        takes_argument_short: &[char],
        iter: I,
    ) -> Result<Vec<Self>, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = iter.into_iter().skip(1);
        let mut processed = vec![];
        let mut rest = vec![];

        while let Some(arg) = args.next() {
            if arg == "--" {
                rest.extend(args.by_ref());
                break;
            }

            if let Some(long) = arg.strip_prefix("--") {
                let long = format!("--{long}");
                match long.split_once('=') {
                    Some((key, value)) if takes_argument.contains(&key) => {
                        processed.push(CliArg::Argument(key.to_owned(), value.to_owned()))
                    }
                    Some(_) => return Err(format!("invalid option: '{long}'")),
                    None if takes_argument.contains(&long.as_str()) => match args.next() {
                        Some(value) => processed.push(CliArg::Argument(long.clone(), value)),
                        None => return Err(format!("'{long}' expects an argument")),
                    },
                    None => processed.push(CliArg::Flag(long.clone())),
                }
                continue;
            }

            // a lone "-" or a negative number is positional
            let is_short_group = arg.len() > 1
                && arg.starts_with('-')
                && !arg[1..].starts_with(|c: char| c.is_ascii_digit());
            if !is_short_group {
                rest.push(arg);
                continue;
            }

            let shorts = &arg[1..];
            for (n, c) in shorts.char_indices() {
                let flag = format!("-{c}");
                if !takes_argument_short.contains(&c) {
                    processed.push(CliArg::Flag(flag));
                    continue;
                }

                let attached = &shorts[n + c.len_utf8()..];
                if attached.starts_with('=') {
                    return Err("invalid option '='".into());
                }
                if !attached.is_empty() {
                    processed.push(CliArg::Argument(flag, attached.to_owned()));
                } else if let Some(value) = args.next() {
                    processed.push(CliArg::Argument(flag, value));
                } else {
                    return Err(format!("'-{c}' expects an argument"));
                }
                break;
            }
        }

        if !rest.is_empty() {
            processed.push(CliArg::Rest(rest));
        }

        Ok(processed)
    }
}
