//! Text rendering of daemon replies.

use std::io::{self, Write};
use uim_core::IdentifiedUser;
use uim_network::SourcesStatus;

const INDENT: &str = "  ";
const NONE: &str = "None";

pub fn write_identified_users(out: &mut impl Write, users: &[IdentifiedUser]) -> io::Result<()> {
    writeln!(out, "Identified users (user identification id, seat id):")?;

    if users.is_empty() {
        return writeln!(out, "{INDENT}{NONE}");
    }

    for user in users {
        writeln!(out, "{INDENT}{user}")?;
    }
    Ok(())
}

pub fn write_sources(out: &mut impl Write, sources: &SourcesStatus) -> io::Result<()> {
    write_names(out, "Enabled sources:", &sources.enabled)?;
    write_names(out, "Disabled sources:", &sources.disabled)
}

/// One line per monitored identification.
pub fn write_identified_user(out: &mut impl Write, user: &IdentifiedUser) -> io::Result<()> {
    writeln!(out, "{user}")
}

fn write_names(out: &mut impl Write, title: &str, names: &[String]) -> io::Result<()> {
    writeln!(out, "{title}")?;

    if names.is_empty() {
        return writeln!(out, "{INDENT}{NONE}");
    }

    for name in names {
        writeln!(out, "{INDENT}{name}")?;
    }
    Ok(())
}
