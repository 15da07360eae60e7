//! A thin CLI wrapper over [`mdns::query::QueryDriver`], for manual and
//! interactive service discovery: `mdns-query _http._tcp.local PTR`.
//!
//! All of the interesting behaviour lives in the library; this binary
//! only parses arguments, wires up logging, and prints what the
//! driver yields until its deadline.

use std::process;

use clap::Parser;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use mdns::cache::Family;
use mdns::query::{FamilyFilter, QueryDriver, QueryOptions};
use mdns::settings::Settings;
use mdns::wire::{ClassCode, Question, Rdata, TypeCode};

/// Error returned by [`parse_qtype`] for an unrecognised query type.
#[derive(Debug)]
struct ParseQTypeError(String);

impl std::fmt::Display for ParseQTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognised query type {:?}", self.0)
    }
}

impl std::error::Error for ParseQTypeError {}

/// Parse a record type by name (`A`, `PTR`, `SRV`, ...) or by its
/// numeric value, for use as a `clap` value parser.
fn parse_qtype(s: &str) -> Result<TypeCode, ParseQTypeError> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Ok(TypeCode::A),
        "NS" => Ok(TypeCode::NS),
        "CNAME" => Ok(TypeCode::CNAME),
        "PTR" => Ok(TypeCode::PTR),
        "TXT" => Ok(TypeCode::TXT),
        "AAAA" => Ok(TypeCode::AAAA),
        "SRV" => Ok(TypeCode::SRV),
        "NSEC" => Ok(TypeCode::NSEC),
        "ANY" => Ok(TypeCode::ANY),
        other => other
            .parse::<u16>()
            .map(TypeCode::from_int)
            .map_err(|_| ParseQTypeError(other.to_string())),
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum FamilyArg {
    Inet,
    Inet6,
    Any,
}

impl From<FamilyArg> for FamilyFilter {
    fn from(value: FamilyArg) -> Self {
        match value {
            FamilyArg::Inet => FamilyFilter::Inet,
            FamilyArg::Inet6 => FamilyFilter::Inet6,
            FamilyArg::Any => FamilyFilter::Any,
        }
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// mDNS service discovery query tool
struct Args {
    /// Domain name to query, e.g. `_http._tcp.local`
    #[clap(value_parser)]
    name: String,

    /// Query type to ask for
    #[clap(default_value = "PTR", value_parser = parse_qtype)]
    qtype: TypeCode,

    /// Restrict to one address family
    #[clap(short, long, value_enum)]
    family: Option<FamilyArg>,

    /// Restrict to one interface by name
    #[clap(short, long)]
    ifname: Option<String>,

    /// Restrict to one interface by index
    #[clap(long)]
    ifindex: Option<u32>,

    /// Overall query deadline, in milliseconds
    #[clap(short, long)]
    timeout_ms: Option<u64>,

    /// Allowed interface name prefix, can be specified more than once
    #[clap(short = 'p', long = "interface-prefix")]
    interface_prefixes: Vec<String>,

    /// Path to a YAML settings file
    #[clap(short, long)]
    config: Option<String>,
}

fn print_response(response: &mdns::interface::DecodedResponse) {
    let scope = match response.family {
        Family::Inet => "inet",
        Family::Inet6 => "inet6",
    };
    println!("\n;; from {scope}#{}", response.ifindex);
    for rr in &response.message.answers {
        println!("{}\t{}\t{}", rr.name, rr.ttl, describe(&rr.rdata));
    }
}

fn describe(rdata: &Rdata) -> String {
    match rdata {
        Rdata::A { address } => format!("A\t{}.{}.{}.{}", address.0, address.1, address.2, address.3),
        Rdata::AAAA { .. } => "AAAA\t(ipv6)".to_string(),
        Rdata::CNAME { name } => format!("CNAME\t{name}"),
        Rdata::PTR { name } => format!("PTR\t{name}"),
        Rdata::SRV { priority, weight, port, target } => {
            format!("SRV\t{priority} {weight} {port} {target}")
        }
        Rdata::TXT { strings } => {
            let joined = strings
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            format!("TXT\t{joined}")
        }
        Rdata::NSEC { next_name, .. } => format!("NSEC\t{next_name}"),
        Rdata::Unknown { rtype, .. } => format!("TYPE{rtype}\t(opaque)"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("could not load configuration: {err}");
            process::exit(1);
        }
    };

    let mut opts = QueryOptions::from_settings(&settings);
    if let Some(family) = args.family {
        opts.family = family.into();
    }
    if args.ifname.is_some() {
        opts.ifname = args.ifname;
    }
    if args.ifindex.is_some() {
        opts.ifindex = args.ifindex;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        opts.timeout_ms = timeout_ms;
    }
    if !args.interface_prefixes.is_empty() {
        opts.interface_prefixes = args.interface_prefixes;
    }
    let question = Question {
        name: args.name.clone(),
        qtype: args.qtype,
        qclass: ClassCode::IN,
        unicast_response: false,
    };

    println!(";; QUESTION");
    println!("{}\t{:?}", question.name, question.qtype);

    let driver = QueryDriver::new(4096);
    let mut responses = driver.stream(vec![question], opts).await;
    while let Some(response) = responses.next().await {
        print_response(&response);
    }
}
