use blogapp_backend::config::Config;
use blogapp_backend::helper::utc_now;
use blogapp_backend::helper::validators::{is_valid_email, is_valid_password};
use blogapp_backend::models::db_operations::users_db_operations;
use blogapp_backend::setup::db_setup;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blog_setup", author, version, about = "A CLI for initial blog setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the schema and default settings. Existing data is kept.
    Setup,
}

#[derive(Subcommand, Debug)]
enum UserAction {
    CreateModerator {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
    ListModerators,
    GrantModerator {
        #[arg(long)]
        email: String,
    },
    RevokeModerator {
        #[arg(long)]
        email: String,
    },
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_blog_database(&config),
        },
        Commands::User { action } => {
            let Some(conn) = open_existing_db(&config) else {
                std::process::exit(1);
            };
            match action {
                UserAction::CreateModerator { email, name, password } => {
                    create_moderator(&conn, &config, email, name, password)
                }
                UserAction::ListModerators => list_moderators(&conn),
                UserAction::GrantModerator { email } => set_moderator(&conn, email, true),
                UserAction::RevokeModerator { email } => set_moderator(&conn, email, false),
                UserAction::ChangePassword { email, new_password } => {
                    change_password(&conn, &config, email, new_password)
                }
            }
        }
    }
}

fn setup_blog_database(config: &Config) {
    let db_path = config.blog_db_path();
    if db_path.exists() {
        println!("ℹ️ Blog database already exists at '{}'. Checking schema...", db_path.display());
    } else {
        println!("\nSetting up blog database at '{}'...", db_path.display());
    }

    if let Some(parent_dir) = db_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            eprintln!("❌ Could not create database directory: {}", e);
            return;
        }
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Could not open blog database file: {}", e);
            return;
        }
    };
    let result = db_setup::configure_connection(&mut conn)
        .map_err(db_setup::SetupError::from)
        .and_then(|_| db_setup::setup_blog_db(&mut conn));
    match result {
        Ok(_) => println!("✅ Blog database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up blog database: {}", e),
    }
}

fn open_existing_db(config: &Config) -> Option<Connection> {
    let db_path = config.blog_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Blog database not found at '{}'. Please run `blog_setup db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(mut conn) => match db_setup::configure_connection(&mut conn) {
            Ok(_) => Some(conn),
            Err(e) => {
                eprintln!("❌ Error configuring database connection: {}", e);
                None
            }
        },
        Err(e) => {
            eprintln!("❌ Error opening blog database: {}", e);
            None
        }
    }
}

fn create_moderator(conn: &Connection, config: &Config, email: &str, name: &str, password: &str) {
    if !is_valid_email(email) {
        eprintln!("❌ Error: '{}' is not a valid e-mail address.", email);
        return;
    }
    if !is_valid_password(password, &config.password) {
        eprintln!(
            "❌ Error: Password must be between {} and {} characters long.",
            config.password.min, config.password.max
        );
        return;
    }

    let created = users_db_operations::create_user(conn, email, name, password, config.password.bcrypt_cost, utc_now())
        .and_then(|_| users_db_operations::set_moderator(conn, email, true));
    match created {
        Ok(_) => println!("✅ Moderator '{}' created successfully.", email),
        Err(e) => eprintln!("❌ Error creating moderator: {}. It might be because the e-mail already exists.", e),
    }
}

fn list_moderators(conn: &Connection) {
    println!("Listing Moderators:");
    match users_db_operations::read_all_moderators(conn) {
        Ok(moderators) if moderators.is_empty() => println!("(none)"),
        Ok(moderators) => {
            for moderator in moderators {
                println!("- {} ({})", moderator.email, moderator.name);
            }
        }
        Err(e) => eprintln!("❌ Error fetching moderators: {}", e),
    }
}

fn set_moderator(conn: &Connection, email: &str, is_moderator: bool) {
    match users_db_operations::set_moderator(conn, email, is_moderator) {
        Ok(0) => eprintln!("❌ Error: No user with e-mail '{}' found.", email),
        Ok(_) if is_moderator => println!("✅ '{}' is now a moderator.", email),
        Ok(_) => println!("✅ '{}' is no longer a moderator.", email),
        Err(e) => eprintln!("❌ Error updating user: {}", e),
    }
}

fn change_password(conn: &Connection, config: &Config, email: &str, new_password: &str) {
    if !is_valid_password(new_password, &config.password) {
        eprintln!(
            "❌ Error: Password must be between {} and {} characters long.",
            config.password.min, config.password.max
        );
        return;
    }
    let user = match users_db_operations::read_user_by_email(conn, email) {
        Ok(Some(user)) => user,
        Ok(None) => {
            eprintln!("❌ Error: No user with e-mail '{}' found.", email);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error reading user: {}", e);
            return;
        }
    };
    match users_db_operations::reset_password(conn, user.id, new_password, config.password.bcrypt_cost) {
        Ok(_) => println!("✅ Password for '{}' changed successfully.", email),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}
