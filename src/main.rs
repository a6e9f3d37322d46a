mod cli;

use clap::Parser;

use cli::{Cli, Commands, RulesCommands};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import {
            files,
            user,
            convention,
            json,
        } => cli::import::run(&files, &user, convention.as_deref(), json),
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                institution,
                priority,
            } => cli::rules::add(&pattern, &category, &match_type, institution.as_deref(), priority),
            RulesCommands::List => cli::rules::list(),
        },
        Commands::Preview {
            user,
            institution,
            apply,
        } => cli::preview::run(&user, &institution, apply),
        Commands::Orphans => cli::orphans::run(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
