use proctrace::{Error, Pid, Process, StopCategory};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut process = match args.as_slice() {
        [flag, pid] if flag == "-p" => {
            let pid = pid
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("invalid process ID {pid}")))?;
            let mut process = Process::attach(Pid::from_raw(pid))?;

            println!("{}", process.wait()?);

            process
        }
        [program, rest @ ..] => Process::launch_with_args(program, rest, true)?,
        [] => {
            eprintln!("usage: basic <program> [args...] | basic -p <pid>");
            std::process::exit(1);
        }
    };

    loop {
        if let Err(e) = process.resume() {
            eprintln!("{e}");
            break;
        }

        let outcome = process.wait()?;

        println!("{outcome}");

        if matches!(outcome.category, StopCategory::Exited | StopCategory::Terminated) {
            break;
        }
    }

    Ok(())
}
