//! `submit` binary entry point.

fn main() {
    submit::logging::init();
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    std::process::exit(submit::cli::run(&args));
}
