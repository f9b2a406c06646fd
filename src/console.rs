//! Operator console
//!
//! Line-oriented command loop over any reader/writer pair. One command per
//! line; replies are plain text except `status`, which prints a JSON
//! envelope so scripts can consume it.

use crate::app::AppContext;
use anyhow::{anyhow, bail};
use resinkit_core::{PrinterSnapshot, PrinterState};
use serde::Serialize;
use std::io::{BufRead, Write};

const HELP: &str = "\
Commands:
  connect            open the serial port and handshake
  disconnect         close the serial port
  status             print the printer status as JSON
  position           query the Z position
  select <file>      open a job file on the printer storage
  print [file]       start printing the selected (or given) file
  pause              pause the running job
  resume             resume a paused job
  stop               stop the running job
  home               home the Z axis
  move <mm>          move Z by a relative distance
  reboot             reboot the mainboard
  recover            stop and reinitialize storage
  ports              list serial ports
  send <command>     send a raw command and print the reply
  help               show this help
  quit               leave the console";

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Status,
    Position,
    Select(String),
    Print(Option<String>),
    Pause,
    Resume,
    Stop,
    Home,
    Move(f64),
    Reboot,
    Recover,
    Ports,
    Send(String),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (line, None),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "status" => Self::Status,
            "position" | "pos" => Self::Position,
            "select" => Self::Select(
                rest.ok_or_else(|| anyhow!("usage: select <file>"))?
                    .to_string(),
            ),
            "print" => Self::Print(rest.map(str::to_string)),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "home" => Self::Home,
            "move" => {
                let raw = rest.ok_or_else(|| anyhow!("usage: move <mm>"))?;
                let distance: f64 = raw
                    .parse()
                    .map_err(|_| anyhow!("invalid distance '{}'", raw))?;
                if !distance.is_finite() {
                    bail!("invalid distance '{}'", raw);
                }
                Self::Move(distance)
            }
            "reboot" => Self::Reboot,
            "recover" => Self::Recover,
            "ports" => Self::Ports,
            "send" => Self::Send(
                rest.ok_or_else(|| anyhow!("usage: send <command>"))?
                    .to_string(),
            ),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{}', try 'help'", other),
        };

        Ok(Some(command))
    }
}

#[derive(Serialize)]
struct StatusReply<'a> {
    ok: bool,
    #[serde(flatten)]
    status: &'a PrinterSnapshot,
}

/// Run the console until `quit` or end of input
pub fn run<R: BufRead, W: Write>(
    context: &AppContext,
    input: R,
    mut output: W,
) -> anyhow::Result<()> {
    writeln!(
        output,
        "resinkit {} - type 'help' for commands",
        crate::VERSION
    )?;

    for line in input.lines() {
        let line = line?;
        match ConsoleCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => execute(context, &command, &mut output)?,
            Err(e) => writeln!(output, "error: {}", e)?,
        }
        output.flush()?;
    }

    Ok(())
}

/// Execute one command, writing its reply
///
/// Printer failures are reported on `output`; only write errors are returned.
pub fn execute<W: Write>(
    context: &AppContext,
    command: &ConsoleCommand,
    output: &mut W,
) -> anyhow::Result<()> {
    let controller = &context.controller;

    match command {
        ConsoleCommand::Connect => report(output, "connect", controller.connect())?,
        ConsoleCommand::Disconnect => {
            controller.disconnect();
            writeln!(output, "disconnected")?;
        }
        ConsoleCommand::Status => {
            let status = controller.print_status();
            let snapshot = controller.snapshot();
            let reply = StatusReply {
                ok: controller.is_connected() && status.state != PrinterState::Error,
                status: &snapshot,
            };
            writeln!(output, "{}", serde_json::to_string_pretty(&reply)?)?;
        }
        ConsoleCommand::Position => {
            if controller.is_connected() {
                writeln!(output, "Z: {:.3}", controller.query_position())?;
            } else {
                writeln!(output, "error: not connected")?;
            }
        }
        ConsoleCommand::Select(file) => {
            if check_job_file(context, file, output)? {
                report(output, "select", controller.select_file(file))?;
            }
        }
        ConsoleCommand::Print(file) => {
            if let Some(file) = file {
                if !check_job_file(context, file, output)? {
                    return Ok(());
                }
            }
            report(output, "print", controller.start_printing(file.as_deref()))?;
        }
        ConsoleCommand::Pause => report(output, "pause", controller.pause_printing())?,
        ConsoleCommand::Resume => report(output, "resume", controller.resume_printing())?,
        ConsoleCommand::Stop => report(output, "stop", controller.stop_printing())?,
        ConsoleCommand::Home => report(output, "home", controller.home_axis())?,
        ConsoleCommand::Move(distance) => {
            report(output, "move", controller.move_relative(*distance))?
        }
        ConsoleCommand::Reboot => report(output, "reboot", controller.reboot())?,
        ConsoleCommand::Recover => report(output, "recover", controller.recover_storage())?,
        ConsoleCommand::Ports => match resinkit_communication::list_ports() {
            Ok(ports) if ports.is_empty() => writeln!(output, "no serial ports found")?,
            Ok(ports) => {
                for port in ports {
                    writeln!(output, "{}\t{}", port.port_name, port.description)?;
                }
            }
            Err(e) => writeln!(output, "error: {}", e)?,
        },
        ConsoleCommand::Send(raw) => match controller.execute(raw) {
            Ok(reply) if reply.is_empty() => writeln!(output, "(no response)")?,
            Ok(reply) => writeln!(output, "{}", reply)?,
            Err(e) => writeln!(output, "error: {}", e)?,
        },
        ConsoleCommand::Help => writeln!(output, "{}", HELP)?,
        ConsoleCommand::Quit => {}
    }

    Ok(())
}

fn report<W: Write>(output: &mut W, operation: &str, succeeded: bool) -> anyhow::Result<()> {
    if succeeded {
        writeln!(output, "{}: ok", operation)?;
    } else {
        writeln!(output, "{}: failed", operation)?;
    }
    Ok(())
}

fn check_job_file<W: Write>(
    context: &AppContext,
    file: &str,
    output: &mut W,
) -> anyhow::Result<bool> {
    if context.config.storage.is_allowed_file(file) {
        return Ok(true);
    }
    writeln!(output, "error: '{}' is not a supported job file", file)?;
    Ok(false)
}
