use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cogni")]
#[command(about = "Per-employee cognitive-state sampling and dashboard store")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON); defaults apply when it does not exist
    #[arg(short, long, default_value = "cogni.json")]
    pub config: PathBuf,

    /// Override the database path from the settings file
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema, the default manager account and the settings file
    Bootstrap,

    /// Create a team
    #[command(name = "add-team")]
    AddTeam { name: String },

    /// Delete a team; its members become unassigned
    #[command(name = "delete-team")]
    DeleteTeam { id: i64 },

    /// Create an employee account
    #[command(name = "add-employee")]
    AddEmployee {
        username: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Team to assign the employee to
        #[arg(short, long)]
        team: Option<i64>,
    },

    /// Delete an employee and all of their samples
    #[command(name = "delete-employee")]
    DeleteEmployee { username: String },

    /// List teams with their members (JSON)
    Teams,

    /// List accounts (JSON)
    Users,

    /// Latest cognitive state of a user (JSON)
    State { username: String },

    /// Full sample history of a user, oldest first (JSON)
    History { username: String },

    /// Log the given employees in and sample until Ctrl-C
    Run {
        /// Employee to log in; repeat for several
        #[arg(short, long = "employee", required = true)]
        employees: Vec<String>,
    },
}
