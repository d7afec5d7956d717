//! Hexpush command line interface.

use std::{process, time::Duration};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
};
use console::style;
use log::{debug, trace, LevelFilter};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use simplelog::*;

use hexpush as hp;

fn main() {
    println!("[HP] hexpush v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Hexpush streams a firmware image, line by line, to a board \
            running a minimal serial bootloader. The bootloader answers every \
            record with a single status byte: 'A' to request the current \
            record (again), anything else to advance to the next one.\n\
            \n\
            Because the board may be in any state when hexpush starts, the \
            push begins by sending a burst of records with bad checksums. \
            Whatever the bootloader was doing, each of those forces its \
            parser back to the start of a record, so no manual reset or \
            coordination is needed: \n\
               \t* send a burst of bad-checksum records \n\
               \t* purge the accumulated status bytes \n\
               \t* stream the image, one record per status byte \n\
               \t* dump whatever the board prints afterwards \n\
            \n\
            The image is never parsed or validated by hexpush; checksum \
            verification is entirely the bootloader's job.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the USB tty device to use")
                .long_help(
                    "the USB tty device to use; may change when the board \
                     is unplugged and re-plugged and may differ between \
                     systems. When not set, hexpush offers the connected \
                     devices for selection.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .long_help(
                    "serial baud rate; use 4800 when pushing over an IR \
                     link, the wired default is 115200",
                )
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits per byte")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking protocol")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FLOW_CONTROL")
                .help("flow control mode")
                .short("-f")
                .long("--flow-control")
                .takes_value(true)
                .possible_values(&["none", "soft", "hard"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("SYNC_REPEATS")
                .help("bad-checksum records sent to synchronize the bootloader")
                .long_help(
                    "how many bad-checksum records to send while forcing the \
                     bootloader into a known state; must cover the device's \
                     worst-case recovery from a partially received record",
                )
                .long("--sync-repeats")
                .takes_value(true)
                .default_value("10")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("SYNC_SETTLE_MS")
                .help("settle time after each synchronization record, in ms")
                .long_help(
                    "wait inserted after each synchronization record so the \
                     device gets at least one processing cycle; raise it for \
                     slow bootloaders",
                )
                .long("--sync-settle")
                .takes_value(true)
                .default_value("100")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DRAIN_SETTLE_MS")
                .help("wait before dumping the device's trailing output, in ms")
                .long("--drain-settle")
                .takes_value(true)
                .default_value("1000")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("READ_TIMEOUT_MS")
                .help("give up when the device stays silent this long, in ms")
                .long_help(
                    "upper bound on waiting for a status byte from the \
                     device; when not set, hexpush waits forever, which is \
                     the safe default for slow links",
                )
                .long("--read-timeout")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("HEX_IMAGE")
                .help("path to the firmware image to be pushed")
                .long_help(
                    "path to the firmware image to be pushed; when not set, \
                     hexpush will look for `firmware.hex` in the current \
                     working directory.",
                )
                .index(1),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'hexpush -v -v -v' or 'hexpush -vvv' vs 'hexpush -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed).unwrap();

    trace!("{:#?}", matches);

    // Arguments with default values ===========================================

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        numeric_value_error("baud-rate", matches.value_of("BAUD_RATE").unwrap());
    });

    let data_bits = match matches.value_of("DATA_BITS").unwrap() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => unreachable!(),
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap() {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => unreachable!(),
    };

    let parity = match matches.value_of("PARITY").unwrap() {
        "none" => Parity::None,
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => unreachable!(),
    };

    let flow_control = match matches.value_of("FLOW_CONTROL").unwrap() {
        "none" => FlowControl::None,
        "soft" => FlowControl::Software,
        "hard" => FlowControl::Hardware,
        _ => unreachable!(),
    };

    let sync_repeats = value_t!(matches.value_of("SYNC_REPEATS"), usize).unwrap_or_else(|_| {
        numeric_value_error("sync-repeats", matches.value_of("SYNC_REPEATS").unwrap());
    });

    let sync_settle = value_t!(matches.value_of("SYNC_SETTLE_MS"), u64).unwrap_or_else(|_| {
        numeric_value_error("sync-settle", matches.value_of("SYNC_SETTLE_MS").unwrap());
    });

    let drain_settle = value_t!(matches.value_of("DRAIN_SETTLE_MS"), u64).unwrap_or_else(|_| {
        numeric_value_error("drain-settle", matches.value_of("DRAIN_SETTLE_MS").unwrap());
    });

    // END - Arguments with default values =====================================

    let mut settings = hp::SettingsBuilder::default()
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .sync_repeats(sync_repeats)
        .sync_settle(Duration::from_millis(sync_settle))
        .drain_settle(Duration::from_millis(drain_settle))
        .finalize();

    // START - Arguments with NO default values ================================

    if matches.is_present("DEVICE_TTY") {
        settings.path = Some(matches.value_of("DEVICE_TTY").unwrap().into());
    }

    if matches.is_present("HEX_IMAGE") {
        settings.hex_image = Some(matches.value_of("HEX_IMAGE").unwrap().into());
    }

    if matches.is_present("READ_TIMEOUT_MS") {
        let read_timeout = value_t!(matches.value_of("READ_TIMEOUT_MS"), u64).unwrap_or_else(|_| {
            numeric_value_error("read-timeout", matches.value_of("READ_TIMEOUT_MS").unwrap());
        });
        settings.read_timeout = Some(Duration::from_millis(read_timeout));
    }

    // END - Arguments =========================================================

    // Run the state machine ===================================================

    let mut ppsm = hp::factory(settings);
    let exit_code = ppsm.run();
    debug!("exit code: {}", exit_code);
    std::process::exit(exit_code.into());
}

fn numeric_value_error(option: &str, given: &str) -> ! {
    println!(
        "{}: `{}` needs to be a numeric value",
        style("error").red(),
        style(option).cyan()
    );
    println!(
        "   {} `{}` is not a valid value",
        style("-->").cyan(),
        style(given).on_red()
    );
    process::exit(-1);
}
