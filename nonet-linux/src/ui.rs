//! Line-oriented terminal UI: slash commands in, notifications out.

use nonet_core::{Direction, EndpointId, Input, Intent, Notification};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::event_loop::Command;

pub const HELP: &str = "\
/advertise            make this device visible
/discover             look for nearby devices
/stop advertise       stop advertising
/stop discover        stop discovering
/stop                 stop both
/connect <id>         connect to a discovered endpoint
/disconnect           drop the current connection
/peers                list discovered endpoints
/status               show mode and connection
/quit                 exit
anything else         send as a message";

#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Commands(Vec<Command>),
    Help,
    Invalid(String),
}

fn intent(i: Intent) -> Command {
    Command::Session(Input::Intent(i))
}

pub fn parse_line(line: &str) -> Line {
    let Some(rest) = line.trim_end_matches(['\r', '\n']).strip_prefix('/') else {
        return Line::Commands(vec![intent(Intent::Send(line.to_owned()))]);
    };
    let mut words = rest.split_whitespace();
    let cmd = words.next().unwrap_or("");
    let arg = words.next();
    let one = |c: Command| Line::Commands(vec![c]);
    match (cmd, arg) {
        ("advertise" | "a", None) => one(intent(Intent::StartAdvertising)),
        ("discover" | "d", None) => one(intent(Intent::StartDiscovery)),
        ("stop", None) => Line::Commands(vec![
            intent(Intent::StopDiscovery),
            intent(Intent::StopAdvertising),
        ]),
        ("stop", Some("advertise" | "advertising")) => one(intent(Intent::StopAdvertising)),
        ("stop", Some("discover" | "discovery")) => one(intent(Intent::StopDiscovery)),
        ("connect" | "c", Some(id)) => one(intent(Intent::Connect(EndpointId::new(id)))),
        ("connect" | "c", None) => Line::Invalid("usage: /connect <id>".into()),
        ("disconnect", None) => one(intent(Intent::Disconnect)),
        ("peers" | "p", None) => one(Command::Peers),
        ("status", None) => one(Command::Status),
        ("quit" | "q" | "exit", None) => one(Command::Quit),
        ("help" | "h" | "?", _) => Line::Help,
        _ => Line::Invalid(format!("unknown command: /{} (try /help)", rest.trim())),
    }
}

pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::Status(text) => format!("* {}", text),
        Notification::TranscriptAppend(msg) => match msg.direction {
            Direction::Sent => format!("> {}", msg),
            Direction::Received => format!("< {}", msg),
        },
        Notification::ConnectionStateChanged(state) => format!("* [{}]", state),
    }
}

/// Read stdin until EOF; EOF quits.
pub async fn read_commands(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stdin read failed");
                break;
            }
        };
        match parse_line(&line) {
            Line::Commands(cmds) => {
                for cmd in cmds {
                    if commands.send(cmd).is_err() {
                        return;
                    }
                }
            }
            Line::Help => println!("{}", HELP),
            Line::Invalid(reason) => println!("* {}", reason),
        }
    }
    let _ = commands.send(Command::Quit);
}

pub async fn print_notifications(mut notifications: mpsc::UnboundedReceiver<Notification>) {
    while let Some(n) = notifications.recv().await {
        println!("{}", render(&n));
    }
}
