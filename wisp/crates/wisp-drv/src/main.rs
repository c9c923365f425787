use anyhow::Context;

fn main() {
    env_logger::init();

    let code = real_main().unwrap_or_else(|err| {
        eprintln!("wisp: {err:#}");
        wisp_drv::EXIT_IO_ERROR
    });
    std::process::exit(code);
}

/// Top-level argument handling uses `anyhow` the way a CLI entry point
/// usually does; the lex/parse/eval pipeline itself uses `DriverError`
/// since its failures need to keep their identity for the §6 exit code
/// mapping, which an opaque `anyhow::Error` would discard.
fn real_main() -> anyhow::Result<i32> {
    let path = std::env::args_os().nth(1).context("usage: wisp <path>")?;
    Ok(wisp_drv::run(std::path::Path::new(&path)))
}
