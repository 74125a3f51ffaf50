use clap::{App, Arg};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use epscore::{CoreConfig, EpsCore, Housekeeping, HousekeepingOut, LatchId, SimulatedEps};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("eps-console")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("🛰️  EPS control core console - interactive exerciser over a simulated power board")
        .arg(
            Arg::with_name("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .help("Producer wait bound per command")
                .takes_value(true)
                .default_value("5000")
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("watchdog-ms")
                .long("watchdog-ms")
                .value_name("MS")
                .help("Hardware watchdog refresh period")
                .takes_value(true)
                .default_value("1000")
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Telemetry output format")
                .takes_value(true)
                .possible_values(&["table", "json"])
                .default_value("table"),
        )
        .get_matches();

    let config = CoreConfig {
        command_timeout: Duration::from_millis(matches.value_of("timeout-ms").unwrap().parse()?),
        watchdog_period: Duration::from_millis(matches.value_of("watchdog-ms").unwrap().parse()?),
    };
    let json_output = matches.value_of("format") == Some("json");

    let device = SimulatedEps::new();
    let controls = device.controls();
    let core = EpsCore::spawn(device, config)?;

    println!("{}", "EPS Control Core Console".bold());
    println!("{}", "************************".bold());
    print_menu();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(command) = tokens.next() else {
            prompt();
            continue;
        };

        match command {
            "0" | "ping" => report_status("ping", core.ping()),
            "1" | "reboot" => report_status("reboot", core.reboot()),
            "2" | "toggle" => match parse_latch(tokens.next()) {
                Some(latch) => report_status(
                    &format!("toggle latch {}", latch.name()),
                    core.toggle_latch(latch),
                ),
                None => usage("2 <latch 0-5>"),
            },
            "3" | "set" => match (parse_latch(tokens.next()), parse_state(tokens.next())) {
                (Some(latch), Some(on)) => report_status(
                    &format!("set latch {}", latch.name()),
                    core.set_latch(latch, on),
                ),
                _ => usage("3 <latch 0-5> <0|1>"),
            },
            "4" | "hardreset" => report_status("hard reset", core.hard_reset()),
            "5" | "hk" => match core.housekeeping() {
                Ok((_, hk)) => print_hk(&hk, json_output)?,
                Err(e) => report_error("get housekeeping", &e.to_string()),
            },
            "6" | "hkout" => match core.housekeeping_out() {
                Ok((_, out)) => print_hk_out(&out, json_output)?,
                Err(e) => report_error("get output housekeeping", &e.to_string()),
            },
            "7" | "getconf" => match core.config() {
                Ok((_, config)) => println!("{}", serde_json::to_string_pretty(&config)?),
                Err(e) => report_error("get config", &e.to_string()),
            },
            "8" | "ppt" => match tokens.next().and_then(|t| t.parse::<u8>().ok()) {
                Some(mode) => match core.config() {
                    Ok((_, mut config)) => {
                        config.ppt_mode = mode;
                        report_status("set config", core.set_config(config));
                    }
                    Err(e) => report_error("get config", &e.to_string()),
                },
                None => usage("8 <ppt mode>"),
            },
            "9" | "stats" => println!("{}", serde_json::to_string_pretty(&core.stats())?),
            "w" | "wdt" => println!(
                "watchdog refreshes observed by the board: {}",
                controls.watchdog_reset_count()
            ),
            "f" | "fault" => {
                match (
                    tokens.next().and_then(|t| t.parse::<i32>().ok()),
                    tokens.next().and_then(|t| t.parse::<u32>().ok()),
                ) {
                    (Some(code), Some(count)) if code < 0 => {
                        controls.inject_bus_fault(code, count);
                        println!("next {count} transactions will fail with {code}");
                    }
                    _ => usage("f <negative code> <count>"),
                }
            }
            "q" | "quit" => break,
            "h" | "help" => print_menu(),
            other => report_error("parse", &format!("unknown command {other:?}")),
        }
        prompt();
    }

    core.shutdown();
    println!("{}", "EPS control core stopped".bold());
    Ok(())
}

fn validate_millis(value: String) -> Result<(), String> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(()),
        _ => Err("must be a positive number of milliseconds".into()),
    }
}

fn print_menu() {
    println!();
    println!("Valid Commands");
    println!("0: Ping");
    println!("1: Reboot");
    println!("2: Toggle latch        (2 <latch 0-5>)");
    println!("3: Set latch           (3 <latch 0-5> <0|1>)");
    println!("4: Hard reset");
    println!("5: Get housekeeping");
    println!("6: Get housekeeping out");
    println!("7: Get config");
    println!("8: Set PPT mode        (8 <mode>)");
    println!("9: Core stats");
    println!("w: Watchdog refresh count");
    println!("f: Inject bus fault    (f <negative code> <count>)");
    println!("q: Quit");
    println!();
    prompt();
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn usage(syntax: &str) {
    println!("{} {}", "usage:".yellow(), syntax);
}

fn report_status(what: &str, result: epscore::EpsResult<i32>) {
    match result {
        Ok(status) if status >= 0 => {
            println!("{} {} (status {})", what, "ok".green(), status);
        }
        Ok(status) => {
            println!("{} {} (bus status {})", what, "failed".red(), status);
        }
        Err(e) => report_error(what, &e.to_string()),
    }
}

fn report_error(what: &str, detail: &str) {
    println!("{} {}: {}", what, "error".red(), detail);
}

fn parse_latch(token: Option<&str>) -> Option<LatchId> {
    LatchId::from_index(token?.parse::<u8>().ok()?)
}

fn parse_state(token: Option<&str>) -> Option<bool> {
    match token? {
        "0" | "off" => Some(false),
        "1" | "on" => Some(true),
        _ => None,
    }
}

fn print_hk(hk: &Housekeeping, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(hk)?);
        return Ok(());
    }

    print!("{}", "Photovoltaic voltage (mV):".bold());
    for pv in &hk.pv_mv {
        print!(" {pv}");
    }
    println!();
    println!("Total photo current [mA]: {}", hk.pc_ma);
    println!("Battery voltage [mV]: {}", hk.bv_mv);
    println!("Total system current [mA]: {}", hk.sc_ma);
    print!("Temp of boost converters and onboard batt (C):");
    for t in &hk.temp_c {
        print!(" {t}");
    }
    println!();
    print!("External board batt (C):");
    for t in &hk.batt_temp_c {
        print!(" {t}");
    }
    println!();
    print!("Number of latchups:");
    for n in &hk.latchup_count {
        print!(" {n}");
    }
    println!();
    println!("Cause of last reset: {:?}", hk.reset_cause);
    println!("Number of reboots: {}", hk.boot_count);
    println!("Software errors: {}", hk.sw_error_count);
    println!("PPT mode: {}", hk.ppt_mode);
    println!("Channel status: {:#04x}", hk.channel_status);
    println!();
    Ok(())
}

fn print_hk_out(out: &HousekeepingOut, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(out)?);
        return Ok(());
    }

    print!("{}", "Rail currents [mA]:".bold());
    for c in &out.current_ma {
        print!(" {c}");
    }
    println!();
    print!("Rail status:");
    for s in &out.output_state {
        print!(" {s}");
    }
    println!();
    print!("Rail on delay [s]:");
    for d in &out.on_delay_s {
        print!(" {d}");
    }
    println!();
    print!("Rail off delay [s]:");
    for d in &out.off_delay_s {
        print!(" {d}");
    }
    println!();
    print!("Number of latchups:");
    for n in &out.latchup_count {
        print!(" {n}");
    }
    println!();
    println!();
    Ok(())
}
