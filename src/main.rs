mod ai;
mod api;
mod common;
mod config;
mod error;
mod network;
mod storage;
mod ui;

use std::error::Error;

use api::{Account, ApiClient};
use clap::{Parser, Subcommand};
use common::RoomId;
use dotenvy::dotenv;
use error::ChatError;
use storage::SessionStore;
use ui::{ChatApp, Exit};

#[derive(Parser)]
#[command(
    name = "rust_room_chat",
    version,
    about = "Terminal client for the room chat service"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and cache the session token
    Login { username: String, password: String },
    /// Create an account
    Signup {
        username: String,
        password: String,
        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,
    },
    /// Forget the cached session
    Logout,
    /// Show who is logged in and since when
    Whoami,
    /// List users you can chat with
    Users,
    /// List your groups
    Groups,
    /// Create a group with the given members
    CreateGroup {
        name: String,
        #[arg(required = true)]
        members: Vec<String>,
    },
    /// Open a 1:1 room with another user
    Chat { user_id: String },
    /// Open a group room by its members
    Group {
        #[arg(required = true)]
        members: Vec<String>,
    },
    /// Chat with the AI assistant
    Ai,
    /// Open a room by its raw identifier
    Room { room_id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);
    let store = SessionStore::with_path(app_config.session_db_path())?;
    let account = Account::new(ApiClient::new(&app_config.api_url), store);

    match cli.command {
        Command::Login { username, password } => match account.login(&username, &password).await {
            Ok(session) => println!("Logged in as {}", session.user_id),
            Err(err) => {
                log::warn!("Login failed: {err}");
                println!("Invalid credentials");
            }
        },
        Command::Signup {
            username,
            password,
            name,
        } => {
            let name = name.unwrap_or_else(|| username.clone());
            match account.signup(&username, &password, &name).await {
                Ok(()) => println!("Account created, you can log in now"),
                Err(err) => {
                    log::error!("Signup failed: {err}");
                    println!("Signup failed");
                }
            }
        }
        Command::Logout => {
            account.logout()?;
            println!("Logged out");
        }
        Command::Whoami => match (account.session(), account.logged_in_at()?) {
            (Ok(session), Some(since)) => println!(
                "{} (since {})",
                session.user_id,
                since.format("%Y-%m-%d %H:%M UTC")
            ),
            (Ok(session), None) => println!("{}", session.user_id),
            (Err(_), _) => println!("Please log in first"),
        },
        Command::Users => match account.users().await {
            Ok(users) => {
                println!("AI  (chat with the assistant)");
                for user in users {
                    println!("{}  {}", user.id, user.username);
                }
            }
            Err(err) => report_listing_error(err),
        },
        Command::Groups => match account.groups().await {
            Ok(groups) => {
                for group in groups {
                    println!("{}  [{}]", group.group_name, group.room_id());
                }
            }
            Err(err) => report_listing_error(err),
        },
        Command::CreateGroup { name, members } => {
            match account.create_group(&name, &members).await {
                Ok(()) => println!("Group created successfully!"),
                Err(ChatError::Validation(message)) => println!("{message}"),
                Err(err) => {
                    log::error!("Error creating group: {err}");
                    println!("An error occurred while creating the group. Please try again.");
                }
            }
        }
        Command::Chat { user_id } => {
            let session = account.session()?;
            let room = RoomId::direct(&user_id, &session.user_id);
            open_room(&account, &app_config, room).await?;
        }
        Command::Group { members } => {
            open_room(&account, &app_config, RoomId::group(&members)).await?;
        }
        Command::Ai => open_room(&account, &app_config, RoomId::ai()).await?,
        Command::Room { room_id } => {
            open_room(&account, &app_config, RoomId::from(room_id.as_str())).await?;
        }
    }

    Ok(())
}

async fn open_room(
    account: &Account,
    app_config: &config::AppConfig,
    room: RoomId,
) -> Result<(), ChatError> {
    let session = account.session()?;
    log::info!("Opening room {room} as {}", session.user_id);

    let app = ChatApp::new(room, session, account.api().clone(), app_config);
    if app.run().await? == Exit::Unauthorized {
        println!("Go back with `users` or `groups` to pick another room.");
    }
    Ok(())
}

fn report_listing_error(err: ChatError) {
    match err {
        ChatError::Forbidden => println!("Session expired, please log in again"),
        ChatError::NotLoggedIn => println!("Please log in first"),
        err => log::error!("Error fetching data: {err}"),
    }
}
