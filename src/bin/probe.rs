use anyhow::Context;
use arabic_suppliers::api;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

/// Runs supplier operations against the live sites and prints the result as JSON
#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
    /// Supplier name as listed by `list`
    #[clap(short, long, env = "PROBE_SUPPLIER", default_value = "FaselHD")]
    supplier: String,

    /// Print compact JSON
    #[clap(long)]
    compact: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Available suppliers
    List,
    /// Channels, default channels, types and languages of the supplier
    Channels,
    /// One page of a channel
    Channel {
        name: String,
        #[clap(short, long, default_value = "1")]
        page: u16,
    },
    Search {
        query: Vec<String>,
    },
    Details {
        id: String,
    },
    Items {
        id: String,
        params: Vec<String>,
    },
    /// Playable links of an episode (`params`) or movie page (`id`)
    Sources {
        id: String,
        params: Vec<String>,
    },
}

#[derive(Serialize)]
struct SupplierInfo {
    name: String,
    channels: Vec<String>,
    default_channels: Vec<String>,
    types: Vec<arabic_suppliers::models::ContentType>,
    languages: Vec<String>,
}

fn print<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let supplier = args.supplier.clone();

    info!("[probe] {:?} on {supplier}", args.command);

    match args.command {
        Command::List => print(&api::avalaible_suppliers(), args.compact),
        Command::Channels => print(
            &SupplierInfo {
                channels: api::get_channels(supplier.clone())?,
                default_channels: api::get_default_channels(supplier.clone())?,
                types: api::get_supported_types(supplier.clone())?,
                languages: api::get_supported_languages(supplier.clone())?,
                name: supplier,
            },
            args.compact,
        ),
        Command::Channel { name, page } => {
            let items = api::load_channel(supplier, name.clone(), page)
                .await
                .with_context(|| format!("loading channel {name}"))?;
            info!("[probe] {} items", items.len());
            print(&items, args.compact)
        }
        Command::Search { query } => {
            let items = api::search(supplier, query.join(" ")).await?;
            info!("[probe] {} items", items.len());
            print(&items, args.compact)
        }
        Command::Details { id } => {
            let details = api::get_content_details(supplier, id.clone())
                .await
                .with_context(|| format!("loading details of {id}"))?;
            print(&details, args.compact)
        }
        Command::Items { id, params } => {
            let items = api::load_media_items(supplier, id, params).await?;
            info!("[probe] {} media items", items.len());
            print(&items, args.compact)
        }
        Command::Sources { id, params } => {
            let sources = api::load_media_item_sources(supplier, id, params).await?;
            info!("[probe] {} sources", sources.len());
            print(&sources, args.compact)
        }
    }
}
