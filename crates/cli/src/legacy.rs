//! Accept the SDK stitcher's single-dash flag style (`-output_size 5760x2880`)
//! alongside the regular `--output-size` form.

use clap::Command;
use std::collections::HashSet;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    pub args: Vec<String>,
    /// Unknown options removed before parsing, with the value they carried.
    pub dropped: Vec<String>,
}

struct Vocabulary {
    longs: HashSet<String>,
    shorts: HashSet<char>,
    subcommands: HashSet<String>,
    /// Root-level options and whether they take a value.
    globals: Vec<(String, bool)>,
}

impl Vocabulary {
    fn of(cmd: &Command) -> Self {
        let mut vocab = Self {
            longs: ["help", "version"].iter().map(|s| s.to_string()).collect(),
            shorts: ['h', 'V'].into_iter().collect(),
            subcommands: cmd
                .get_subcommands()
                .map(|sub| sub.get_name().to_string())
                .chain(std::iter::once("help".to_string()))
                .collect(),
            globals: Vec::new(),
        };
        for arg in cmd.get_arguments() {
            if let Some(long) = arg.get_long() {
                vocab
                    .globals
                    .push((long.to_string(), arg.get_action().takes_values()));
            }
        }
        vocab.collect(cmd);
        vocab
    }

    fn collect(&mut self, cmd: &Command) {
        for arg in cmd.get_arguments() {
            if let Some(long) = arg.get_long() {
                self.longs.insert(long.to_string());
            }
            if let Some(short) = arg.get_short() {
                self.shorts.insert(short);
            }
        }
        for sub in cmd.get_subcommands() {
            self.collect(sub);
        }
    }

    /// Canonical `--long[=value]` form of an option token, or `None` when the
    /// option is unknown.
    fn canonical(&self, token: &str) -> Option<String> {
        let body = token.trim_start_matches('-');
        if !token.starts_with("--") && body.chars().count() == 1 {
            let short = body.chars().next()?;
            return self.shorts.contains(&short).then(|| token.to_string());
        }
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };
        let name = name.replace('_', "-");
        if !self.longs.contains(&name) {
            return None;
        }
        Some(match value {
            Some(value) => format!("--{name}={value}"),
            None => format!("--{name}"),
        })
    }

    fn global(&self, token: &str) -> Option<bool> {
        if let Some(short) = token.strip_prefix('-').filter(|s| s.len() == 1) {
            let short = short.chars().next()?;
            return (short == 'v').then_some(false);
        }
        let name = token.strip_prefix("--")?;
        let (name, inline) = match name.split_once('=') {
            Some((name, _)) => (name, true),
            None => (name, false),
        };
        self.globals
            .iter()
            .find(|(long, _)| long == name)
            .map(|(_, takes_value)| *takes_value && !inline)
    }
}

fn is_option(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some('-')
        && chars
            .next()
            .is_some_and(|c| !c.is_ascii_digit() && c != '.')
}

/// Rewrite `args` (program name first) into the form `cmd` parses.
///
/// Single-dash long options become `--kebab-case`; unknown options are
/// dropped together with a following value; a bare legacy invocation
/// without a subcommand is treated as `stitch`.
pub fn normalize<I>(cmd: &Command, args: I) -> Normalized
where
    I: IntoIterator<Item = String>,
{
    let vocab = Vocabulary::of(cmd);
    let mut out = Normalized::default();
    let mut iter = args.into_iter().peekable();
    out.args.extend(iter.next());

    while let Some(token) = iter.next() {
        if token == "--" {
            out.args.push(token);
            out.args.extend(iter.by_ref());
            break;
        }
        if !is_option(&token) {
            out.args.push(token);
            continue;
        }
        match vocab.canonical(&token) {
            Some(canonical) => out.args.push(canonical),
            None => {
                let mut dropped = token.clone();
                let swallow = !token.contains('=')
                    && iter
                        .peek()
                        .is_some_and(|next| !is_option(next) && !vocab.subcommands.contains(next));
                if swallow {
                    if let Some(value) = iter.next() {
                        dropped.push(' ');
                        dropped.push_str(&value);
                    }
                }
                out.dropped.push(dropped);
            }
        }
    }

    insert_default_subcommand(&vocab, &mut out.args);
    out
}

fn insert_default_subcommand(vocab: &Vocabulary, args: &mut Vec<String>) {
    let mut i = 1;
    while i < args.len() {
        let token = &args[i];
        if matches!(token.as_str(), "--help" | "-h" | "--version" | "-V") {
            return;
        }
        match vocab.global(token) {
            Some(takes_value) => i += if takes_value { 2 } else { 1 },
            None => break,
        }
    }
    if let Some(token) = args.get(i) {
        if is_option(token) {
            args.insert(i, "stitch".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::{CommandFactory, Parser};

    fn run(args: &[&str]) -> Normalized {
        normalize(&Cli::command(), args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_legacy_invocation() {
        let normalized = run(&[
            "panostitch",
            "-inputs",
            "left.insv",
            "right.insv",
            "-output",
            "out.mp4",
            "-output_size",
            "5760x2880",
            "-enable_flowstate",
        ]);
        assert_eq!(
            normalized.args,
            vec![
                "panostitch",
                "stitch",
                "--inputs",
                "left.insv",
                "right.insv",
                "--output",
                "out.mp4",
                "--output-size",
                "5760x2880",
                "--enable-flowstate",
            ]
        );
        assert!(normalized.dropped.is_empty());
        assert!(Cli::try_parse_from(normalized.args).is_ok());
    }

    #[test]
    fn test_unknown_flags_are_dropped_with_value() {
        let normalized = run(&[
            "panostitch",
            "stitch",
            "-inputs",
            "a.insv",
            "-enable_magic",
            "-lens_profile",
            "wide",
            "-output",
            "o.mp4",
        ]);
        assert_eq!(
            normalized.args,
            vec!["panostitch", "stitch", "--inputs", "a.insv", "--output", "o.mp4"]
        );
        assert_eq!(normalized.dropped, vec!["-enable_magic", "-lens_profile wide"]);
    }

    #[test]
    fn test_globals_before_legacy_flags() {
        let normalized = run(&[
            "panostitch",
            "-v",
            "--settings",
            "s.json",
            "-inputs",
            "a.insp",
            "-output",
            "a.jpg",
        ]);
        assert_eq!(&normalized.args[..5], &["panostitch", "-v", "--settings", "s.json", "stitch"]);
        let cli = Cli::try_parse_from(normalized.args).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_help_and_subcommands_untouched() {
        assert_eq!(run(&["panostitch", "-help"]).args, vec!["panostitch", "--help"]);
        assert_eq!(
            run(&["panostitch", "batch", "jobs.json"]).args,
            vec!["panostitch", "batch", "jobs.json"]
        );
    }

    #[test]
    fn test_negative_values_are_not_options() {
        let normalized = run(&[
            "panostitch",
            "-inputs",
            "a.mp4",
            "-output",
            "b.mp4",
            "-bitrate",
            "-5",
        ]);
        assert_eq!(&normalized.args[6..], &["--bitrate", "-5"]);
        assert!(Cli::try_parse_from(normalized.args).is_ok());
    }
}
