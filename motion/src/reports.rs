//! The `$` system command reports.

use crate::interpreter::ModalState;
use crate::settings::Settings;
use cnc_protocol::{Response, VERSION};
use embedded_io::Write;

/// `$`: the list of system commands.
pub fn help<W: Write>(out: &mut W) -> Result<(), W::Error> {
    Response::feedback_from_fmt(format_args!("HLP:$$ $G $I $J=line ? ! ~ ctrl-x")).write_to(out)
}

/// `$$`: one line per setting.
pub fn settings<W: Write>(settings: &Settings, out: &mut W) -> Result<(), W::Error> {
    for (id, value) in settings.entries() {
        Response::Setting { id, value }.write_to(out)?;
    }
    Ok(())
}

/// `$I`: firmware name and version.
pub fn build_info<W: Write>(out: &mut W) -> Result<(), W::Error> {
    Response::feedback_from_fmt(format_args!("VER:{}", VERSION)).write_to(out)
}

/// `$G`: the active modal state.
pub fn parser_state<W: Write>(modal: &ModalState, out: &mut W) -> Result<(), W::Error> {
    Response::feedback_from_fmt(format_args!("GC:{}", modal)).write_to(out)
}
