use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use text_io::read;

use ujianonline::libujian::auth::{self, Role};
use ujianonline::libujian::editor;
use ujianonline::libujian::error::Error;
use ujianonline::libujian::question::Question;
use ujianonline::libujian::results;
use ujianonline::libujian::store::Store;
use ujianonline::libujian::util::score_to_grade;

#[derive(Parser, Debug)]
#[command(name = "Pengelola (Ujian Online admin)")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "info")]
    log_level: String,
    #[arg(short, long, value_name = "FILE", default_value = "ujianonline.db")]
    db: PathBuf,
    /// Directory with the static seed JSON files (admin-config.json, ...).
    #[arg(short, long, value_name = "DIR")]
    seed: Option<PathBuf>,
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the exam to students.
    Publish,
    /// Pause the exam.
    Unpublish,
    /// Replace an exam's question set from a JSON array file.
    Import { exam: String, json: PathBuf },
    /// Write a dated backup of the question bank.
    Export {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Write a dated backup of users, questions and results.
    ExportAll {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Top-10 attempts by score.
    Leaderboard,
    /// All attempts, most recent first.
    Activity,
    /// Wipe the results collection.
    Reset,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level)).init();

    let store = match Store::create_or_open(&args.db) {
        Ok(store) => match args.seed {
            Some(seed) => store.with_seed_dir(seed),
            None => store,
        },
        Err(err) => {
            error!("{}{}", "Unable to open database: ".red(), err);
            std::process::exit(1);
        }
    };

    let session = match auth::login(&store, &args.email, &args.password) {
        Ok(session) => session,
        Err(err) => {
            error!("{}", format!("Login failed: {}", err).red());
            std::process::exit(1);
        }
    };
    if session.role != Role::Admin {
        error!("{}", "This tool is for the admin account only.".red());
        std::process::exit(1);
    }

    if let Err(err) = run(&store, args.command) {
        error!("{}", format!("{}", err).red());
        std::process::exit(1);
    }

    if let Err(err) = store.close() {
        error!("{}", format!("Failed to close database: {}", err).red());
        std::process::exit(1);
    }
}

fn run(store: &Store, command: Commands) -> Result<(), Error> {
    match command {
        Commands::Publish => {
            editor::publish(store)?;
            println!(
                "{}",
                "Exam published: students can now start.".bright_green()
            );
        }
        Commands::Unpublish => {
            editor::unpublish(store)?;
            println!("{}", "Exam paused.".yellow());
        }
        Commands::Import { exam, json } => {
            let text = std::fs::read_to_string(&json)?;
            let batch: Vec<Question> = serde_json::from_str(&text)?;
            info!(
                "{}",
                format!("Importing {} questions into '{}'...", batch.len(), exam).blue()
            );
            for question in &batch {
                info!(
                    "{}",
                    format!("├ {} ({:?}): {}", question.id, question.kind, question.text).blue()
                );
            }
            let count = editor::batch_upload(store, &exam, batch)?;
            println!(
                "{}",
                format!("Uploaded {} questions for '{}'.", count, exam).bright_green()
            );
        }
        Commands::Export { dir } => {
            let path = editor::export_questions(store, &dir)?;
            println!("{}", format!("Questions exported to {:?}.", path).bright_green());
        }
        Commands::ExportAll { dir } => {
            let path = editor::export_all(store, &dir)?;
            println!("{}", format!("Backup written to {:?}.", path).bright_green());
        }
        Commands::Leaderboard => {
            let all = results::all(store)?;
            let top = results::leaderboard(&all, 10);
            if top.is_empty() {
                println!("{}", "No attempts recorded yet.".yellow());
            }
            for (rank, entry) in top.iter().enumerate() {
                println!(
                    "{} {} - {} ({})",
                    format!("{}.", rank + 1).cyan(),
                    entry.name.bold(),
                    entry.score,
                    score_to_grade(entry.score)
                );
            }
        }
        Commands::Activity => {
            for entry in results::activity(&results::all(store)?) {
                println!(
                    "{} {} {} {}",
                    entry.date.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    entry.user_email,
                    entry.exam_id.cyan(),
                    entry.score
                );
            }
        }
        Commands::Reset => {
            print!(
                "{} ",
                "Really wipe the whole results collection? (y/n):".bright_red()
            );
            let confirm: String = read!("{}\n");
            if confirm.trim() == "y" {
                results::reset(store)?;
                println!("{}", "Leaderboard reset.".bright_green());
            } else {
                println!("{}", "Nothing was deleted.".yellow());
            }
        }
    }
    Ok(())
}
