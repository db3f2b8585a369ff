use clap::Parser;
use colored::Colorize;
use env_logger::Env;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::PathBuf;
use text_io::read;

use ujianonline::libujian::auth::{self, Role, Session};
use ujianonline::libujian::error::Error;
use ujianonline::libujian::exam::ExamSession;
use ujianonline::libujian::question::{Answer, QuestionType};
use ujianonline::libujian::store::Store;
use ujianonline::libujian::util::score_to_grade;

#[derive(Parser, Debug)]
#[command(name = "Ujian Online")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "ujianonline.db")]
    db: PathBuf,
    /// Directory with the static seed JSON files (questions.json, ...).
    #[arg(short, long, value_name = "DIR")]
    seed: Option<PathBuf>,
    #[arg(short, long, default_value = "exam1")]
    exam: String,
    #[arg(short, long, default_value = "error")]
    log_level: String,
}

#[derive(Debug, PartialEq)]
enum Command {
    Pick(Vec<usize>),
    Text(String),
    Clear,
    Next,
    Prev,
    Jump(usize),
    Submit,
    Quit,
    Unknown,
}

impl Command {
    fn from_str(kind: QuestionType, input: &str) -> Command {
        let trimmed = input.trim();
        match trimmed {
            "n" => return Command::Next,
            "p" => return Command::Prev,
            "s" => return Command::Submit,
            "q" => return Command::Quit,
            "c" => return Command::Clear,
            _ => {}
        }
        if let Some(rest) = trimmed.strip_prefix("g ") {
            return match rest.trim().parse::<usize>() {
                Ok(num) if num >= 1 => Command::Jump(num - 1),
                _ => Command::Unknown,
            };
        }
        match kind {
            QuestionType::Essay => {
                if trimmed.is_empty() {
                    Command::Unknown
                } else {
                    Command::Text(trimmed.to_string())
                }
            }
            _ => {
                let parsed: Result<Vec<usize>, _> = trimmed
                    .split(',')
                    .map(|part| part.trim().parse::<usize>())
                    .collect();
                match parsed {
                    Ok(nums) if !nums.is_empty() && nums.iter().all(|n| *n >= 1) => {
                        Command::Pick(nums.iter().map(|n| n - 1).collect())
                    }
                    _ => Command::Unknown,
                }
            }
        }
    }
}

fn main() -> Result<(), Error> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level)).init();

    let mut store = Store::create_or_open(&args.db)?;
    if let Some(seed) = args.seed {
        store = store.with_seed_dir(seed);
    }

    let session = match auth::current_session(&store)? {
        Some(session) => session,
        None => match login_prompt(&store) {
            Ok(session) => session,
            Err(err) => return finish(store, Err(err)),
        },
    };
    if session.role != Role::Student {
        println!(
            "{}",
            "Access denied: only students can take the exam.".bright_red()
        );
        return finish(store, Err(Error::AccessDenied { required: "student" }));
    }

    let mut exam = match ExamSession::load(&store, &session, &args.exam) {
        Ok(exam) => exam,
        Err(err @ Error::NotPublished) => {
            println!(
                "{}",
                "The exam has not been published by the admin yet. Come back later!".yellow()
            );
            return finish(store, Err(err));
        }
        Err(err @ Error::EmptyBank(_)) => {
            println!("{}", "The question bank for this exam is empty.".yellow());
            return finish(store, Err(err));
        }
        Err(err) => return finish(store, Err(err)),
    };

    println!(
        "{}",
        format!(
            "==========> {} ({} questions) <==========",
            exam.exam_id(),
            exam.navigator.total()
        )
        .cyan()
    );

    loop {
        render_question(&exam);
        print!(
            "{} ",
            "Answer (choices like `1` or `1,3`, essay text as-is; n/p/g <num> to move, c to clear, s to submit, q to quit):"
                .cyan()
        );
        let line: String = read!("{}\n");
        let question_id = exam.current_question().id.clone();
        let command = Command::from_str(exam.current_question().kind, line.as_str());
        debug!("command: {:?}", command);

        match command {
            Command::Pick(indices) => {
                let value = match exam.current_question().kind {
                    QuestionType::Single if indices.len() == 1 => Answer::Single(indices[0]),
                    QuestionType::Single => {
                        println!("{}", "Pick exactly one choice here.".bright_red());
                        continue;
                    }
                    _ => Answer::Multiple(indices),
                };
                record_answer(&mut exam, &question_id, value);
            }
            Command::Text(text) => record_answer(&mut exam, &question_id, Answer::Essay(text)),
            Command::Clear => match exam.current_question().kind {
                QuestionType::Multiple => {
                    record_answer(&mut exam, &question_id, Answer::Multiple(vec![]))
                }
                QuestionType::Essay => {
                    record_answer(&mut exam, &question_id, Answer::Essay(String::new()))
                }
                QuestionType::Single => {
                    println!("{}", "A single-choice answer cannot be cleared.".yellow())
                }
            },
            Command::Next => {
                exam.navigator.next();
            }
            Command::Prev => {
                exam.navigator.prev();
            }
            Command::Jump(index) => {
                if !exam.navigator.jump_to(index) {
                    println!(
                        "{}",
                        format!("There are only {} questions!", exam.navigator.total())
                            .bright_red()
                    );
                }
            }
            Command::Submit => {
                print!(
                    "{} ",
                    format!(
                        "You have answered {}/{} questions. Finish the exam? (y/n):",
                        exam.answered_count(),
                        exam.navigator.total()
                    )
                    .cyan()
                );
                let confirm: String = read!("{}\n");
                if confirm.trim() == "y" {
                    break;
                }
            }
            Command::Quit => {
                println!("{}", "Quitting without submitting!".cyan());
                return finish(store, Ok(()));
            }
            Command::Unknown => {
                println!("{}", "I did not understand that.".yellow());
            }
        }
    }

    match exam.submit() {
        Ok(result) => {
            println!(
                "{}",
                format!(
                    "Exam finished. Your score: {} (grade {})",
                    result.score,
                    score_to_grade(result.score)
                )
                .bright_green()
            );
            finish(store, Ok(()))
        }
        Err(err @ Error::StaleQuestionSet) => {
            println!(
                "{}",
                "The admin changed the questions while you were answering; this attempt was not graded."
                    .bright_red()
            );
            finish(store, Err(err))
        }
        Err(err) => finish(store, Err(err)),
    }
}

fn login_prompt(store: &Store) -> Result<Session, Error> {
    loop {
        print!("{} ", "Login (l), register (r) or quit (q)?".cyan());
        let choice: String = read!("{}\n");
        match choice.trim() {
            "q" => return Err(Error::NotLoggedIn),
            "r" => {
                print!("Name: ");
                let name: String = read!("{}\n");
                print!("Email: ");
                let email: String = read!("{}\n");
                print!("Password: ");
                let password: String = read!("{}\n");
                match auth::register(store, &name, &email, &password) {
                    Ok(()) => println!(
                        "{}",
                        "Registration successful. Please log in.".bright_green()
                    ),
                    Err(err @ (Error::InvalidEmail | Error::WeakPassword | Error::EmailTaken)) => {
                        println!("{}", err.to_string().bright_red())
                    }
                    Err(err) => return Err(err),
                }
            }
            _ => {
                print!("Email: ");
                let email: String = read!("{}\n");
                print!("Password: ");
                let password: String = read!("{}\n");
                match auth::login(store, &email, &password) {
                    Ok(session) => {
                        println!(
                            "{}",
                            format!("Welcome back, {}!", session.name).bright_green()
                        );
                        return Ok(session);
                    }
                    Err(Error::BadCredentials) => {
                        println!("{}", "Wrong email or password.".bright_red())
                    }
                    Err(err) => return Err(err),
                }
            }
        }
    }
}

fn record_answer(exam: &mut ExamSession, question_id: &str, value: Answer) {
    match exam.set_answer(question_id, value) {
        Ok(()) => {}
        Err(Error::Persistence(err)) => {
            warn!("[Exam] Autosave failed: {:?}", err);
            println!(
                "{}",
                "Autosave is failing; your answers are kept in memory for now.".yellow()
            );
        }
        Err(Error::InvalidAnswerShape { .. }) => {
            println!("{}", "That choice does not exist.".bright_red());
        }
        Err(err) => println!("{}", err.to_string().bright_red()),
    }
}

fn render_question(exam: &ExamSession) {
    let index = exam.navigator.current();
    let question = exam.current_question();
    let leading = format!("{}/{}. ", index + 1, exam.navigator.total());
    println!(
        "\n{}{}",
        leading.cyan(),
        question.text.clone().black().bold().on_white()
    );
    let indent = " ".repeat(leading.len());
    if let Some(media) = &question.media {
        println!("{}(media: {})", indent, media);
    }

    match question.kind {
        QuestionType::Single | QuestionType::Multiple => {
            let selected: BTreeSet<usize> = match exam.answer(&question.id) {
                Some(Answer::Single(i)) => BTreeSet::from([*i]),
                Some(Answer::Multiple(v)) => v.iter().copied().collect(),
                _ => BTreeSet::new(),
            };
            for (i, choice) in question.choices.iter().enumerate() {
                let marker = if selected.contains(&i) { "*" } else { " " };
                println!(
                    "{}{}{} {}",
                    indent,
                    format!("{}.", i + 1).bold(),
                    marker.bright_green(),
                    choice
                );
            }
        }
        QuestionType::Essay => match exam.answer(&question.id) {
            Some(Answer::Essay(text)) if !text.is_empty() => {
                println!("{}Your answer: {}", indent, text.italic())
            }
            _ => println!("{}{}", indent, "(no answer yet)".dimmed()),
        },
    }
}

fn finish(store: Store, to_error: Result<(), Error>) -> Result<(), Error> {
    if let Err(err) = store.close() {
        warn!("[Store] Failed to close cleanly: {:?}", err);
    }
    to_error
}
