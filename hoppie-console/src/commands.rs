//! Terminal command line grammar.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true, help_template = "{subcommands}")]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send a message: send <TO> <TYPE> <PACKET...>
    Send {
        to:     String,
        #[arg(value_name = "TYPE")]
        kind:   String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        packet: Vec<String>,
    },
    /// Set the flight callsign
    Callsign { callsign: String },
    /// Set and save the Hoppie logon code
    Logon { token: String },
    /// Switch avionics power
    Power { state: Power },
    /// Show the link state
    Status,
    /// Leave the console
    #[command(alias = "exit")]
    Quit,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

impl Command {
    /// Parse one input line. `Ok(None)` for a blank line; errors carry clap's
    /// rendered message (including `help` output).
    pub fn parse_line(line: &str) -> Result<Option<Self>, clap::Error> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        Line::try_parse_from(words).map(|l| Some(l.command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_keeps_packet_words() {
        let cmd = Command::parse_line("send SERVER inforeq METAR LIPE").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Send { to: "SERVER".into(), kind: "inforeq".into(), packet: vec!["METAR".into(), "LIPE".into()] }
        );
    }

    #[test]
    fn power_and_aliases() {
        assert_eq!(Command::parse_line("power off").unwrap(), Some(Command::Power { state: Power::Off }));
        assert_eq!(Command::parse_line("exit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse_line("   ").unwrap(), None);
    }

    #[test]
    fn bad_input_is_an_error() {
        assert!(Command::parse_line("send SERVER telex").is_err());
        assert!(Command::parse_line("power maybe").is_err());
        assert!(Command::parse_line("launch").is_err());
        let help = Command::parse_line("help").unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
