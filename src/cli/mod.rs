// src/cli/mod.rs — CLI definition (clap derive)

pub mod analyze;
pub mod chat;
pub mod progress;
pub mod reports;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "actionlens",
    about = "Describe the actions in a video, frame by frame, with a vision model",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Suppress progress output (only emit the final report)
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a recorded video file
    File {
        /// Path to the video (mp4, avi, mov, mkv, flv, wmv, webm, m4v)
        path: String,

        /// Analyze every Nth frame
        #[arg(short, long)]
        interval: Option<u32>,

        /// Vision model id
        #[arg(short, long)]
        model: Option<String>,

        /// Max simultaneous frame analyses
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Analyze live capture from a camera (Ctrl-C stops early)
    Live {
        /// Capture duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Analyze every Nth frame
        #[arg(short, long)]
        interval: Option<u32>,

        /// Vision model id
        #[arg(short, long)]
        model: Option<String>,

        /// Capture device (overrides config)
        #[arg(long)]
        device: Option<String>,
    },
    /// List saved reports, newest first
    Reports,
    /// Print a saved report
    Show {
        /// Report name (with or without .txt)
        filename: String,

        /// Only print the executive summary
        #[arg(long)]
        summary_only: bool,
    },
    /// Ask one question about a report, or about using ActionLens
    Ask {
        /// Report to ask about; omit for usage questions
        #[arg(short, long)]
        report: Option<String>,

        /// The question
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Interactive chat about a report, or about using ActionLens
    Chat {
        /// Report to chat about; omit for usage questions
        #[arg(short, long)]
        report: Option<String>,
    },
}
