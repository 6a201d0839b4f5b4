use crate::settings::Settings;
use cnc_protocol::{Axis, MachineState, StatusReport, AXIS_COUNT};

/// Build a status report from a snapshot of the axis positions in steps.
pub fn status_report(
    state: MachineState,
    positions: [i32; AXIS_COUNT],
    queued_blocks: usize,
    buffer_capacity: usize,
    feed_rate: f32,
    settings: &Settings,
) -> StatusReport {
    StatusReport {
        state,
        machine_position: Axis::ALL.map(|axis| settings.steps_to_mm(axis, positions[axis.index()])),
        queued_blocks: queued_blocks as u16,
        buffer_capacity: buffer_capacity as u16,
        feed_rate,
    }
}
