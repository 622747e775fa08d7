//! netlabelctl: control client for netlabeld
//!
//! Translates a command line into one IPC command, sends it to the daemon
//! and prints the response as JSON.
//!
//! # Usage
//!
//! ```bash
//! netlabelctl map add bob address 10.0.0.0/24 cipso 7
//! netlabelctl static add eth0 192.168.0.0/16 system_u:object_r:peer_t:s0
//! netlabelctl accept off
//! netlabelctl test out bob 10.0.0.5
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use netlabel::addr::AddrMask;
use netlabel::cipso::DoiDefinition;
use netlabel::config::{DomainMapping, LeafConfig, StaticMapping};
use netlabel::ipc::{IpcClient, IpcCommand, IpcResponse};

const DEFAULT_SOCKET: &str = "/var/run/netlabeld.sock";

fn print_help() {
    println!(
        r#"netlabelctl v{}

Control client for netlabeld.

USAGE:
    netlabelctl [-s <SOCKET>] <COMMAND>

COMMANDS:
    ping | version | status | protocols | shutdown
    map list
    map add <DOMAIN|default> unlabeled
    map add <DOMAIN|default> cipso <DOI>
    map add <DOMAIN|default> address <CIDR> unlabeled|cipso <DOI>
    map del <DOMAIN|default> [address <CIDR>]
    static list
    static add <IFACE|default> <CIDR> <SECCTX>
    static del <IFACE|default> <CIDR>
    static deldefault
    accept [on|off]
    doi add <DOI> [pass|local]
    doi del <DOI>
    netdev down <IFINDEX>
    test out <DOMAIN|default> [PEER]
    test in <IFINDEX> <SOURCE>

ENVIRONMENT:
    NETLABELD_IPC_SOCKET    Socket path [default: {}]
"#,
        netlabel::VERSION,
        DEFAULT_SOCKET
    );
}

/// `default` names the default domain or interface
fn optional_name(name: &str) -> Option<String> {
    if name == "default" {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_cidr(value: &str) -> Result<AddrMask> {
    value
        .parse()
        .map_err(|e| anyhow!("invalid address range '{value}': {e}"))
}

fn parse_doi(value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("invalid DOI '{value}'"))
}

fn parse_leaf(args: &[&str]) -> Result<LeafConfig> {
    match args {
        ["unlabeled"] => Ok(LeafConfig::Unlabeled),
        ["cipso", doi] => Ok(LeafConfig::Cipso {
            doi: parse_doi(doi)?,
        }),
        _ => bail!("expected 'unlabeled' or 'cipso <DOI>'"),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => bail!("expected on or off, got '{value}'"),
    }
}

/// Build the IPC command for a command line (without the socket option)
fn parse_command(args: &[&str]) -> Result<IpcCommand> {
    let command = match args {
        ["ping"] => IpcCommand::Ping,
        ["version"] => IpcCommand::Version,
        ["status"] => IpcCommand::Status,
        ["protocols"] => IpcCommand::Protocols,
        ["shutdown"] => IpcCommand::Shutdown,

        ["map", "list"] => IpcCommand::ListDomains,
        ["map", "add", domain, "unlabeled"] => IpcCommand::AddDomain {
            mapping: DomainMapping::unlabeled(optional_name(domain).as_deref()),
        },
        ["map", "add", domain, "cipso", doi] => IpcCommand::AddDomain {
            mapping: DomainMapping::cipso(optional_name(domain).as_deref(), parse_doi(doi)?),
        },
        ["map", "add", domain, "address", cidr, leaf @ ..] => IpcCommand::AddDomainAddress {
            domain: optional_name(domain),
            address: parse_cidr(cidr)?,
            leaf: parse_leaf(leaf)?,
        },
        ["map", "del", domain] => IpcCommand::RemoveDomain {
            domain: optional_name(domain),
        },
        ["map", "del", domain, "address", cidr] => IpcCommand::RemoveDomainAddress {
            domain: optional_name(domain),
            address: parse_cidr(cidr)?,
        },

        ["static", "list"] => IpcCommand::ListStatic,
        ["static", "add", interface, cidr, secctx] => IpcCommand::AddStatic {
            mapping: StaticMapping {
                interface: optional_name(interface),
                address: parse_cidr(cidr)?,
                secctx: (*secctx).to_string(),
            },
        },
        ["static", "del", interface, cidr] => IpcCommand::RemoveStatic {
            interface: optional_name(interface),
            address: parse_cidr(cidr)?,
        },
        ["static", "deldefault"] => IpcCommand::RemoveStaticDefault,

        ["accept"] => IpcCommand::GetAcceptUnlabeled,
        ["accept", value] => IpcCommand::SetAcceptUnlabeled {
            accept: parse_bool(value)?,
        },

        ["doi", "add", doi] => IpcCommand::AddDoi {
            definition: DoiDefinition::pass(parse_doi(doi)?),
        },
        ["doi", "add", doi, "pass"] => IpcCommand::AddDoi {
            definition: DoiDefinition::pass(parse_doi(doi)?),
        },
        ["doi", "add", doi, "local"] => IpcCommand::AddDoi {
            definition: DoiDefinition::local(parse_doi(doi)?),
        },
        ["doi", "del", doi] => IpcCommand::RemoveDoi {
            doi: parse_doi(doi)?,
        },

        ["netdev", "down", ifindex] => IpcCommand::NotifyInterfaceDown {
            ifindex: ifindex
                .parse()
                .with_context(|| format!("invalid interface index '{ifindex}'"))?,
        },

        ["test", "out", domain] => IpcCommand::TestOutbound {
            domain: optional_name(domain),
            peer: None,
        },
        ["test", "out", domain, peer] => IpcCommand::TestOutbound {
            domain: optional_name(domain),
            peer: Some(
                peer.parse::<IpAddr>()
                    .with_context(|| format!("invalid peer address '{peer}'"))?,
            ),
        },
        ["test", "in", ifindex, source] => IpcCommand::TestInbound {
            ifindex: ifindex
                .parse()
                .with_context(|| format!("invalid interface index '{ifindex}'"))?,
            source: source
                .parse()
                .with_context(|| format!("invalid source address '{source}'"))?,
        },

        _ => bail!("unknown command: {}", args.join(" ")),
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut socket = std::env::var("NETLABELD_IPC_SOCKET")
        .map_or_else(|_| PathBuf::from(DEFAULT_SOCKET), PathBuf::from);

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let mut rest = Vec::with_capacity(raw.len());
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-s" | "--socket" => {
                let path = iter.next().context("--socket requires a path")?;
                socket = PathBuf::from(path);
            }
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("netlabelctl v{}", netlabel::VERSION);
                return Ok(());
            }
            other => rest.push(other),
        }
    }

    if rest.is_empty() {
        print_help();
        std::process::exit(1);
    }

    let command = parse_command(&rest)?;
    let client = IpcClient::new(&socket);
    let response = client
        .send(command)
        .await
        .with_context(|| format!("Failed to reach netlabeld at {socket:?}"))?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if let IpcResponse::Error(err) = response {
        bail!(err);
    }
    Ok(())
}
