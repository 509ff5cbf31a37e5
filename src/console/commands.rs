//! Command handlers

use core::fmt::Write;

use super::parser::ParsedCommand;
use super::ConsoleError;
use crate::directory::ItemDirectory;
use crate::item::DynItem;
use crate::link::LinkHandle;

/// What the commands operate on.
pub struct CommandContext<'a> {
    pub items: &'a ItemDirectory,
    pub links: &'a [LinkHandle],
}

type Handler = fn(&ParsedCommand<'_>, &CommandContext<'_>, &mut dyn Write) -> Result<(), ConsoleError>;

/// Command descriptor
pub struct CommandDescriptor {
    pub name: &'static str,
    pub brief: &'static str,
    pub handler: Handler,
}

/// All available commands
pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor { name: "help", brief: "List commands", handler: cmd_help },
    CommandDescriptor { name: "show", brief: "Show item values (name or prefix*)", handler: cmd_show },
    CommandDescriptor { name: "set", brief: "Set item value", handler: cmd_set },
    CommandDescriptor { name: "reset", brief: "Restore item initial value", handler: cmd_reset },
    CommandDescriptor { name: "info", brief: "Item type, policy and change count", handler: cmd_info },
    CommandDescriptor { name: "stats", brief: "Link counters", handler: cmd_stats },
];

/// Execute a parsed command
pub fn execute(
    cmd: &ParsedCommand<'_>,
    ctx: &CommandContext<'_>,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if cmd.command.is_empty() {
        return Ok(()); // Empty line, do nothing
    }

    let handler = COMMANDS
        .iter()
        .find(|c| c.name == cmd.command)
        .ok_or(ConsoleError::UnknownCommand)?;

    (handler.handler)(cmd, ctx, out)
}

/// Get all command names
pub fn command_names() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|c| c.name)
}

// --- Command Implementations ---

fn cmd_help(cmd: &ParsedCommand<'_>, _ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    if let Some(name) = cmd.arg(0) {
        let c = COMMANDS
            .iter()
            .find(|c| c.name == name)
            .ok_or(ConsoleError::UnknownCommand)?;
        let _ = writeln!(out, "{}: {}", c.name, c.brief);
    } else {
        for c in COMMANDS {
            let _ = writeln!(out, "  {:<8} {}", c.name, c.brief);
        }
    }
    Ok(())
}

fn show_one(item: &dyn DynItem, out: &mut dyn Write) -> Result<(), ConsoleError> {
    let value = item.value_string().ok_or(ConsoleError::Busy)?;
    let _ = writeln!(out, "{}={}", item.name(), value);
    Ok(())
}

fn cmd_show(cmd: &ParsedCommand<'_>, ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    match cmd.rest(0) {
        Some(pattern) if pattern.ends_with('*') => {
            let prefix = pattern.trim_end_matches('*');
            for item in ctx.items.matching(prefix) {
                show_one(item.as_ref(), out)?;
            }
        }
        Some(name) => {
            let item = ctx.items.find(name).ok_or(ConsoleError::UnknownItem)?;
            show_one(item.as_ref(), out)?;
        }
        None => {
            for item in ctx.items.iter() {
                show_one(item.as_ref(), out)?;
            }
        }
    }
    Ok(())
}

fn cmd_set(cmd: &ParsedCommand<'_>, ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    let name = cmd.arg(0).ok_or(ConsoleError::MissingArg)?;
    let value = cmd.rest(1).ok_or(ConsoleError::MissingArg)?;
    let item = ctx.items.find(name).ok_or(ConsoleError::UnknownItem)?;

    let status = item.set_string(value).ok_or(ConsoleError::InvalidValue)?;
    if !status.valid {
        return Err(ConsoleError::Rejected);
    }
    if !status.changed {
        let _ = writeln!(out, "{} unchanged", name);
        return Ok(());
    }

    let _ = write!(out, "{}={}", name, value);
    if status.queued {
        let _ = write!(out, " (sent)");
    }
    if !status.committed {
        let _ = write!(out, " (pending)");
    }
    let _ = writeln!(out);
    Ok(())
}

fn cmd_reset(cmd: &ParsedCommand<'_>, ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    let name = cmd.rest(0).ok_or(ConsoleError::MissingArg)?;
    let item = ctx.items.find(name).ok_or(ConsoleError::UnknownItem)?;
    let status = item.reset();
    if status.accepted() {
        let _ = writeln!(out, "{}={}", name, item.initial_string());
    } else {
        let _ = writeln!(out, "{} unchanged", name);
    }
    Ok(())
}

fn cmd_info(cmd: &ParsedCommand<'_>, ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    let name = cmd.rest(0).ok_or(ConsoleError::MissingArg)?;
    let item = ctx.items.find(name).ok_or(ConsoleError::UnknownItem)?;
    let _ = writeln!(out, "name:    {}", item.name());
    let _ = writeln!(out, "type:    {} x {}", item.element_type(), item.count());
    let _ = writeln!(
        out,
        "policy:  {} / {}",
        item.rx_tx_type().as_str(),
        item.update_store_type().as_str()
    );
    let _ = writeln!(out, "initial: {}", item.initial_string());
    match (item.value_string(), item.change_count()) {
        (Some(value), Some(count)) => {
            let _ = writeln!(out, "value:   {}", value);
            let _ = writeln!(out, "changes: {}", count);
        }
        _ => return Err(ConsoleError::Busy),
    }
    Ok(())
}

fn cmd_stats(_cmd: &ParsedCommand<'_>, ctx: &CommandContext<'_>, out: &mut dyn Write) -> Result<(), ConsoleError> {
    if ctx.links.is_empty() {
        let _ = writeln!(out, "no links");
        return Ok(());
    }
    for link in ctx.links {
        let s = link.stats();
        let _ = writeln!(
            out,
            "{}: rx={} tx={} malformed={} checksum={} unknown={} mismatch={} overrun={} dropped={} queued={}",
            link.name(),
            s.decoded,
            s.transmitted,
            s.malformed,
            s.checksum_mismatch,
            s.unknown_item,
            s.type_mismatch,
            s.rx_overrun,
            s.queue_full,
            link.pending()
        );
    }
    Ok(())
}
