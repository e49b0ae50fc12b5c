use clap::{ArgAction, Args, Parser, Subcommand};

pub const TAILOR_BEFORE_HELP: &str = concat!(
    "tailor-image ",
    env!("CARGO_PKG_VERSION"),
    " – shared image index for build workers\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  publish          Record a built artifact in the index under the index lock.\n",
    "  cleanup          Delete old images by count or age and prune the index.\n",
    "  index show       Print the index, or one build version of it.\n",
    "  lock status      Show the Lock tag of an object.\n",
    "  lock release     Clear a Lock tag left behind by a killed worker.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "tailor-image",
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = TAILOR_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct TailorCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "URL",
        help = "Object store: memory://, file:///PATH or s3:// (overrides TAILOR_STORE)",
        global = true
    )]
    pub store: Option<String>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Record a built artifact in the shared index.")]
    Publish(PublishArgs),
    #[command(about = "Apply a retention policy to published images.")]
    Cleanup(CleanupArgs),
    #[command(subcommand, about = "Inspect the index.")]
    Index(IndexCommand),
    #[command(subcommand, about = "Inspect or clear the index lock.")]
    Lock(LockCommand),
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[arg(long, alias = "apt-repo", help = "Bucket holding the index")]
    pub bucket: String,
    #[arg(long, value_name = "KEY", help = "Object key of the index")]
    pub index_key: String,
    #[arg(
        long,
        value_name = "YYYYMMDD.HHMMSS",
        help = "Build version; defaults to the current UTC time"
    )]
    pub timestamp: Option<String>,
    #[arg(
        long = "path",
        value_name = "SEGMENTS",
        help = "Slash separated location below the version, e.g. ros2/desktop/focal"
    )]
    pub artifact_path: String,
    #[arg(long, help = "Published file name")]
    pub file: String,
    #[arg(long, help = "Checksum of the published file")]
    pub checksum: String,
    #[arg(
        long,
        value_name = "ID",
        help = "CloudFront distribution to invalidate (overrides TAILOR_DISTRIBUTION_ID)"
    )]
    pub distribution_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    #[arg(long, alias = "apt-repo", help = "Bucket holding the images")]
    pub bucket: String,
    #[arg(long, help = "Release label the images are published under")]
    pub release_label: String,
    #[arg(long, help = "Organization whose images are cleaned up")]
    pub organization: String,
    #[arg(long, value_name = "DAYS", help = "Delete images older than this")]
    pub days_to_keep: Option<u32>,
    #[arg(
        long,
        value_name = "N",
        help = "Keep the newest N images per name and extension"
    )]
    pub num_to_keep: Option<usize>,
    #[arg(long, help = "Report what would change without writing")]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    #[command(about = "Print the index without taking the lock.")]
    Show(IndexShowArgs),
}

#[derive(Args, Debug)]
pub struct IndexShowArgs {
    #[arg(long, alias = "apt-repo")]
    pub bucket: String,
    #[arg(long, value_name = "KEY")]
    pub index_key: String,
    #[arg(long, value_name = "YYYYMMDD.HHMMSS", help = "Show a single build version")]
    pub version: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    #[command(about = "Show whether an object is locked.")]
    Status(LockArgs),
    #[command(about = "Set the Lock tag back to False.")]
    Release(LockArgs),
}

#[derive(Args, Debug)]
pub struct LockArgs {
    #[arg(long, alias = "apt-repo")]
    pub bucket: String,
    #[arg(long, value_name = "KEY")]
    pub key: String,
}
