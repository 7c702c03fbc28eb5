use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Personality quizzes in the terminal.
#[derive(Parser, Debug)]
#[command(name = "quiz")]
#[command(author, version, about = "Play personality quizzes and keep your badges")]
pub struct Cli {
    /// Database URL for saved progress
    #[arg(long, env = "QUIZ_DB_URL", default_value = "sqlite://quiz.sqlite3", global = true)]
    pub db: String,

    /// Load quizzes from a JSON catalog instead of the built-in one
    #[arg(long, env = "QUIZ_CATALOG", value_name = "PATH", global = true)]
    pub catalog: Option<PathBuf>,

    /// Pause before showing a photo analysis result
    #[arg(long, value_name = "MS", default_value_t = 0, global = true)]
    pub analysis_delay_ms: u64,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List quizzes and batteries
    List,

    /// Play one quiz
    Play {
        /// Quiz id, e.g. `toxic`
        quiz: String,

        /// Who the questions are about
        #[arg(long, value_name = "NAME")]
        subject: Option<String>,

        /// Photo for the age quiz
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,

        /// Face box detected in the photo, as WIDTHxHEIGHT
        #[arg(long, value_name = "WxH", requires = "photo")]
        face: Option<String>,
    },

    /// Play every part of a battery and get the combined result
    Battery {
        /// Battery id, e.g. `future.life`
        id: String,
    },

    /// Buy the premium result for a quiz
    Unlock {
        quiz: String,

        /// Simulate a declined card
        #[arg(long, conflicts_with = "cancel")]
        decline: bool,

        /// Simulate the player closing the payment sheet
        #[arg(long)]
        cancel: bool,
    },

    /// Show unlocks, play counts and badges
    Status,

    /// Toggle sound effects
    Sound,

    /// Forget unlocks, play counts and badges
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}
