//! Test fixture for `kiln-process` integration tests.

use std::{
    env,
    io::{self, Write},
    process, thread,
    time::Duration,
};

fn value<T: std::str::FromStr>(value: Option<String>, flag: &str) -> T {
    let Some(value) = value else {
        eprintln!("missing value for {flag}");
        process::exit(2);
    };
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid value for {flag}: {value}");
        process::exit(2);
    })
}

fn write_repeated(mut writer: impl Write, mut bytes: usize) -> io::Result<()> {
    let buf = [b'x'; 8 * 1024];
    while bytes > 0 {
        let n = bytes.min(buf.len());
        writer.write_all(&buf[..n])?;
        bytes -= n;
    }
    writer.flush()
}

fn main() {
    let mut exit_code = 0;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout-bytes" => {
                let bytes: usize = value(args.next(), &arg);
                if write_repeated(io::stdout().lock(), bytes).is_err() {
                    process::exit(3);
                }
            }
            "--stderr" => {
                let text: String = value(args.next(), &arg);
                eprintln!("{text}");
            }
            "--print-env" => {
                let key: String = value(args.next(), &arg);
                println!("{}", env::var(&key).unwrap_or_default());
            }
            "--sleep-ms" => {
                let ms: u64 = value(args.next(), &arg);
                thread::sleep(Duration::from_millis(ms));
            }
            "--exit" => {
                exit_code = value(args.next(), &arg);
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }
    process::exit(exit_code);
}
