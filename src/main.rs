// Copyright 2026 Adam Greig
// Licensed under the Apache-2.0 and MIT licenses.

use std::{fs, io::{self, Read, Write}, time::Instant};
use clap::{Command, Arg, ArgAction, crate_description, crate_version};
use clap_num::maybe_hex;
use anyhow::Context;

use mpssedap::{Config, Session};
use mpssedap::input::{parse_hex, parse_usbmon};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("mpssedap")
        .version(crate_version!())
        .about(crate_description!())
        .arg(Arg::new("quiet")
             .help("Suppress informative output and raise log level to errors only")
             .long("quiet")
             .short('q')
             .action(ArgAction::SetTrue))
        .arg(Arg::new("verbose")
             .help("Increase log level, specify once for info, twice for debug, three times for trace")
             .long("verbose")
             .short('v')
             .action(ArgAction::Count)
             .conflicts_with("quiet"))
        .arg(Arg::new("trace-mpsse")
             .help("Print each MPSSE command as it is decoded")
             .long("trace-mpsse")
             .short('m')
             .action(ArgAction::SetTrue))
        .arg(Arg::new("trace-jtag")
             .help("Print every TAP state and IR/DR update")
             .long("trace-jtag")
             .short('j')
             .action(ArgAction::SetTrue))
        .arg(Arg::new("capacity")
             .help("Maximum input bytes and generated clocks (decimal, or hex with 0x prefix)")
             .long("capacity")
             .short('c')
             .action(ArgAction::Set)
             .default_value("0x100000")
             .value_parser(maybe_hex::<usize>))
        .arg(Arg::new("usbmon")
             .help("Input is a usbmon text log; decode the bulk-OUT payloads")
             .long("usbmon")
             .short('u')
             .action(ArgAction::SetTrue))
        .arg(Arg::new("file")
             .help("Capture to decode, as whitespace-separated hex bytes (default: stdin)"))
        .get_matches();

    let t0 = Instant::now();
    let quiet = matches.get_flag("quiet");
    let verbose = matches.get_count("verbose");
    let env = if quiet {
        env_logger::Env::default().default_filter_or("error")
    } else if verbose == 0 {
        env_logger::Env::default().default_filter_or("warn")
    } else if verbose == 1 {
        env_logger::Env::default().default_filter_or("info")
    } else if verbose == 2 {
        env_logger::Env::default().default_filter_or("debug")
    } else {
        env_logger::Env::default().default_filter_or("trace")
    };
    env_logger::Builder::from_env(env).format_timestamp(None).init();

    let config = Config {
        trace_mpsse: matches.get_flag("trace-mpsse"),
        trace_jtag: matches.get_flag("trace-jtag"),
        capacity: *matches.get_one::<usize>("capacity").unwrap(),
    };

    // Read the whole capture before decoding anything.
    let text = match matches.get_one::<String>("file").map(String::as_str) {
        Some("-") | None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).context("Reading standard input")?;
            text
        },
        Some(path) => fs::read_to_string(path).with_context(|| format!("Reading {}", path))?,
    };

    let data = if matches.get_flag("usbmon") {
        parse_usbmon(&text, config.capacity)?
    } else {
        parse_hex(&text, config.capacity)?
    };
    log::info!("Loaded {} bytes of MPSSE commands", data.len());

    let mut session = Session::new(config);
    let result = {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let result = session.run(&data, &mut out);
        out.flush()?;
        result
    };

    // Report what was decoded before any error, then propagate it.
    let t1 = t0.elapsed();
    match &result {
        Ok(summary) if !quiet => {
            println!("Decoded {}", summary);
            println!("Finished in {}.{:02}s", t1.as_secs(), t1.subsec_millis()/10);
        },
        Ok(_) => (),
        Err(_) => log::error!("Stopped after decoding {}", session.summary()),
    }

    result?;
    Ok(())
}
