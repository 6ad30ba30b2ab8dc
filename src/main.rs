use std::io::Write;

use dbus_stubgen::{generate, GenOpts, OutputMode};

// Unwrapping is fine here, this is just a command line tool.

fn main() {
    env_logger::init();

    let matches = clap::App::new("D-Bus C stub generator")
        .about("Generates object and proxy C glue from D-Bus XML introspection data")
        .arg(clap::Arg::with_name("file").long("file").takes_value(true).value_name("FILE")
            .help("D-Bus XML introspection file. Reads from stdin otherwise."))
        .arg(clap::Arg::with_name("mode").short("m").long("mode").takes_value(true).value_name("MODE")
            .help("Which side to generate; valid values are: 'object', 'proxy'. Defaults to 'object'."))
        .arg(clap::Arg::with_name("prefix").short("p").long("prefix").takes_value(true).value_name("PREFIX")
            .help("Prefix for generated function names, defaults to 'dbus'."))
        .arg(clap::Arg::with_name("interfaces").short("f").long("interfaces").takes_value(true).value_name("FILTER")
            .help("Comma separated list of interface names. Only matching interfaces are generated if set."))
        .arg(clap::Arg::with_name("timeout").long("timeout").takes_value(true).value_name("MS")
            .help("Timeout in milliseconds for generated blocking calls. Defaults to the connection default."))
        .arg(clap::Arg::with_name("output").short("o").long("output").takes_value(true).value_name("FILE")
            .help("Write generated source into the specified file instead of stdout"))
        .arg(clap::Arg::with_name("header").long("header").takes_value(true).value_name("FILE")
            .help("Also write prototypes and typedefs into the specified header file"))
        .get_matches();

    let xmldata = match matches.value_of("file") {
        Some(path) => std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e)),
        None => {
            let mut s = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut s).unwrap();
            s
        }
    };

    let mode = match matches.value_of("mode").map(|s| s.to_lowercase()).as_deref() {
        None | Some("object") => OutputMode::Object,
        Some("proxy") => OutputMode::Proxy,
        _ => panic!("Invalid mode specified"),
    };

    let timeout_ms = matches
        .value_of("timeout")
        .map(|t| t.parse().unwrap_or_else(|_| panic!("Invalid timeout {:?}", t)))
        .unwrap_or(-1);

    let interfaces = matches
        .value_of("interfaces")
        .map(|s| s.split(',').map(|e| e.trim().to_owned()).collect());

    let opts = GenOpts {
        mode,
        prefix: matches.value_of("prefix").unwrap_or("dbus").into(),
        filename: matches.value_of("file").map(|x| x.into()),
        interfaces,
        timeout_ms,
        command_line: std::env::args().skip(1).collect::<Vec<String>>().join(" "),
    };

    let output = match generate(&xmldata, &opts) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut h: Box<dyn std::io::Write> = match matches.value_of("output") {
        Some(path) => Box::new(std::fs::File::create(path)
            .unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e))),
        None => Box::new(std::io::stdout()),
    };
    h.write_all(output.source().as_bytes()).unwrap();
    h.flush().unwrap();

    if let Some(path) = matches.value_of("header") {
        let mut h = std::fs::File::create(path)
            .unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e));
        h.write_all(output.header().as_bytes()).unwrap();
    }
}
