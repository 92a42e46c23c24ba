pub mod commands;
pub mod handlers;

pub use commands::command_argument_builder;
pub use handlers::{
    build_request, handle_scan, handle_templates, init_logging, load_request_file, parse_standards,
    render_json_report, render_template_list, render_text_report, write_report,
};
