pub mod icons;
pub mod report;

pub use report::{
    format_event_line, format_phase_line, format_run_row, print_checkpoint, print_cleanup,
    print_events, print_run, print_run_table, print_work_item,
};
