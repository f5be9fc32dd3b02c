use std::process::ExitCode;

fn main() -> ExitCode {
    whatsapp_converter_lib::run()
}
