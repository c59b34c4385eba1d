use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "imgtask", version, about = "Run image import/export/clone tasks")]
pub struct Args {
    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Task type: import, export or clone.
    #[arg(long = "type")]
    pub task_type: String,

    /// Task input as a JSON object.
    #[arg(long, group = "input_source")]
    pub input: Option<String>,

    /// Read the task input JSON from a file.
    #[arg(long, group = "input_source")]
    pub input_file: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    /// Token passed through to object stores that need the caller's identity.
    #[arg(long, env = "IMGTASK_AUTH_TOKEN")]
    pub auth_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task, run it to completion and print the final record.
    ///
    /// Task and image records are held in memory for the duration of one
    /// invocation. `export` and `clone` therefore cannot see images from
    /// earlier runs and end with NotFound; they need a `ServicesFactory` that
    /// supplies a persistent image repository.
    Run(RunArgs),
    /// Print the effective configuration as TOML.
    Config,
}
