use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// bind a booking to a charging session and follow it to completion
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// join a dock and print the session link
    Join {
        /// code printed on the dock
        dock_code: String,
    },
    /// list your confirmed bookings
    Bookings,
    /// bind a booking to a session link and follow charging progress
    Charge(ChargeArgs),
    /// cancel a confirmed booking
    Cancel {
        /// booking id as shown by `bookings`
        booking_id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ChargeArgs {
    /// session link produced by `join`
    pub session_url: String,

    /// booking code to bind (defaults to the first confirmed booking)
    #[clap(short = 'b', long)]
    pub booking_code: Option<String>,

    /// state of charge to stop at, in percent
    #[clap(
        short = 't',
        long,
        default_value_t = 80,
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    pub target_soc: u8,

    /// replay charger messages from a JSON script instead of the realtime provider
    #[clap(long)]
    pub script: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn charge_defaults_target_soc() {
        let cli = Cli::parse_from(["ev_session", "charge", "https://x/y?a=1"]);

        let Command::Charge(args) = cli.command else {
            panic!("expected charge command");
        };
        assert_eq!(args.target_soc, 80);
        assert_eq!(args.booking_code, None);
        assert_eq!(args.script, None);
    }

    #[test]
    fn charge_accepts_booking_and_script() {
        let cli = Cli::parse_from([
            "ev_session",
            "charge",
            "https://x/y",
            "-b",
            "BK-1",
            "--target-soc",
            "90",
            "--script",
            "demo.json",
        ]);

        let Command::Charge(args) = cli.command else {
            panic!("expected charge command");
        };
        assert_eq!(args.booking_code.as_deref(), Some("BK-1"));
        assert_eq!(args.target_soc, 90);
        assert_eq!(
            args.script.as_deref().and_then(|path| path.to_str()),
            Some("demo.json")
        );
    }

    #[test]
    fn rejects_target_soc_above_one_hundred() {
        let result = Cli::try_parse_from(["ev_session", "charge", "https://x/y", "-t", "101"]);

        assert!(result.is_err());
    }

    #[test]
    fn parses_join_and_cancel() {
        let cli = Cli::parse_from(["ev_session", "join", "DOCK-4"]);
        assert!(matches!(cli.command, Command::Join { dock_code } if dock_code == "DOCK-4"));

        let cli = Cli::parse_from(["ev_session", "cancel", "b-1"]);
        assert!(matches!(cli.command, Command::Cancel { booking_id } if booking_id == "b-1"));
    }
}
