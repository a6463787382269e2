//! The simulator console: an owned command registry plus a stdin REPL.
//!
//! Commands are registered on an explicitly constructed
//! [`CommandRegistry`] that lives exactly as long as the console – built
//! on start, cleared on stop, nothing process-wide. The built-in commands
//! act on the simulation by pushing [`Request`]s into the same inbound
//! queue the network feeds, so a console `setspeed` and a Mission Control
//! drive message take exactly the same path through the dispatcher.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use roversim_bridge::queue::QueueSender;
use roversim_types::Request;

/// A named console command.
pub struct Command {
    name: String,
    usage: String,
    handler: Box<dyn Fn(&[&str]) + Send>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        usage: impl Into<String>,
        handler: impl Fn(&[&str]) + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            usage: usage.into(),
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }
}

/// Name-to-handler registry with explicit lifecycle.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, replacing any previous command with the same
    /// name.
    pub fn register(&mut self, command: Command) {
        self.commands.insert(command.name.clone(), command);
    }

    pub fn unregister(&mut self, name: &str) {
        self.commands.remove(name);
    }

    /// Execute the named command. Returns `false` when no such command is
    /// registered.
    pub fn execute(&self, name: &str, args: &[&str]) -> bool {
        match self.commands.get(name) {
            Some(command) => {
                (command.handler)(args);
                true
            }
            None => false,
        }
    }

    /// Registered commands with usage strings, sorted by name.
    pub fn listing(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .commands
            .values()
            .map(|c| (c.name.clone(), c.usage.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// Build the standard command set. Commands capture the request queue and
/// act through the dispatcher like any network peer.
pub fn built_in_commands(
    requests: QueueSender<Request>,
    shutdown: Arc<AtomicBool>,
) -> Vec<Command> {
    let mut commands = Vec::new();

    let queue = requests.clone();
    commands.push(Command::new(
        "setspeed",
        "setspeed <straight> <steer>",
        move |args| {
            let parsed = match args {
                [straight, steer] => straight.parse::<f64>().ok().zip(steer.parse::<f64>().ok()),
                _ => None,
            };
            match parsed {
                Some((straight, steer)) => {
                    let _ = queue.push(Request::Drive { straight, steer });
                }
                None => println!("usage: {}", "setspeed <straight> <steer>".yellow()),
            }
        },
    ));

    let queue = requests.clone();
    commands.push(Command::new("estop", "estop <on|off>", move |args| {
        match args {
            ["on"] => {
                let _ = queue.push(Request::EmergencyStop { stop: true });
            }
            ["off"] => {
                let _ = queue.push(Request::EmergencyStop { stop: false });
            }
            _ => println!("usage: {}", "estop <on|off>".yellow()),
        }
    }));

    let queue = requests;
    commands.push(Command::new(
        "motor",
        "motor <name> <power>",
        move |args| {
            let parsed = match args {
                [name, power] => power.parse::<f64>().ok().map(|p| (*name, p)),
                _ => None,
            };
            match parsed {
                Some((name, power)) => {
                    let _ = queue.push(Request::MotorPower {
                        motor: name.to_string(),
                        power,
                    });
                }
                None => println!("usage: {}", "motor <name> <power>".yellow()),
            }
        },
    ));

    commands.push(Command::new("quit", "quit", move |_args| {
        shutdown.store(true, Ordering::SeqCst);
    }));

    commands
}

/// Run the blocking stdin REPL until EOF or shutdown.
///
/// `help` is handled here because it needs the registry itself; everything
/// else goes through [`CommandRegistry::execute`].
pub fn run_repl(registry: &CommandRegistry, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "roversim>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {e}", "read error".red());
                break;
            }
        }

        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        if name == "help" {
            println!();
            for (name, usage) in registry.listing() {
                println!("  {:10} – {}", name.bold().cyan(), usage);
            }
            println!("  {:10} – this list", "help".bold().cyan());
            println!();
            continue;
        }

        if !registry.execute(name, &args) {
            println!(
                "{} '{}'. Type {} for available commands.",
                "unknown command:".red(),
                name.yellow(),
                "help".bold()
            );
        }
    }
}
