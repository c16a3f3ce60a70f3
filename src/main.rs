use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpstore::{
    Config, Error, LeasePageSize, LeaseStatsQuery, LeaseStore, LeaseStoreRegistry, Result,
    SqliteConnection, SubnetId,
};

#[derive(Parser)]
#[command(name = "dhcpstore")]
#[command(author, version, about = "Inspect and maintain DHCP lease databases", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "dhcpstore.json")]
    config: PathBuf,

    /// Overrides the log level of the settings file.
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates the lease schema in the configured SQLite database.
    InitSchema,
    ShowConfig,
    ListLeases {
        /// List IPv6 leases instead of IPv4 leases.
        #[arg(long)]
        v6: bool,
        #[arg(long, default_value_t = 100)]
        page_size: usize,
    },
    /// Prints lease counts per subnet and state.
    Stats {
        #[arg(long)]
        v6: bool,
        #[command(flatten)]
        selection: SubnetSelection,
    },
    /// Deletes reclaimed leases that expired long enough ago.
    Reclaim {
        /// Seconds since expiration.
        #[arg(long)]
        older_than: u32,
    },
}

#[derive(Args)]
#[group(multiple = false)]
struct SubnetSelection {
    /// Only count leases of this subnet.
    #[arg(long)]
    subnet: Option<SubnetId>,
    /// Only count leases of subnets in an inclusive range, e.g. `1-10`.
    #[arg(long, value_parser = parse_range)]
    range: Option<(SubnetId, SubnetId)>,
}

fn parse_range(text: &str) -> std::result::Result<(SubnetId, SubnetId), String> {
    let (first, last) = text
        .split_once('-')
        .ok_or_else(|| format!("expected FIRST-LAST, got '{text}'"))?;
    let first = first.trim().parse().map_err(|e| format!("{first}: {e}"))?;
    let last = last.trim().parse().map_err(|e| format!("{last}: {e}"))?;
    Ok((first, last))
}

fn open_store(config: &Config) -> Result<Box<dyn LeaseStore>> {
    LeaseStoreRegistry::new().create_from_parameters(config.lease_parameters())
}

fn list_leases(store: &dyn LeaseStore, v6: bool, page_size: usize) -> Result<()> {
    let page_size = LeasePageSize::new(page_size)?;
    let mut count = 0usize;

    if v6 {
        println!(
            "{:<40} {:<6} {:<10} {:<10} {:<8}",
            "Address", "Type", "IAID", "Subnet", "State"
        );
        println!("{}", "-".repeat(78));
        let mut lower_bound = IpAddr::V6(Ipv6Addr::UNSPECIFIED);
        loop {
            let page = store.get_leases6_page(lower_bound, page_size)?;
            let Some(last) = page.last() else { break };
            lower_bound = IpAddr::V6(last.address);
            for lease in &page {
                println!(
                    "{:<40} {:<6} {:<10} {:<10} {:<8}",
                    lease.address, lease.lease_type, lease.iaid, lease.subnet_id, lease.state
                );
            }
            count += page.len();
        }
    } else {
        println!(
            "{:<16} {:<26} {:<10} {:<24} {:<8}",
            "Address", "Hardware Address", "Subnet", "Expires At", "State"
        );
        println!("{}", "-".repeat(88));
        let mut lower_bound = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        loop {
            let page = store.get_leases4_page(lower_bound, page_size)?;
            let Some(last) = page.last() else { break };
            lower_bound = IpAddr::V4(last.address);
            for lease in &page {
                let hwaddr = lease
                    .hwaddr
                    .as_ref()
                    .map(|hw| hw.to_string())
                    .unwrap_or_default();
                let expires = lease
                    .expiration()
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<16} {:<26} {:<10} {:<24} {:<8}",
                    lease.address, hwaddr, lease.subnet_id, expires, lease.state
                );
            }
            count += page.len();
        }
    }

    if count == 0 {
        println!("No leases.");
    }
    Ok(())
}

fn print_stats(store: &dyn LeaseStore, v6: bool, selection: &SubnetSelection) -> Result<()> {
    // The store hands back queries that have already been started.
    let mut query: Box<dyn LeaseStatsQuery + '_> = match (selection.subnet, selection.range, v6) {
        (Some(subnet_id), _, false) => store.start_subnet_lease_stats_query4(subnet_id)?,
        (Some(subnet_id), _, true) => store.start_subnet_lease_stats_query6(subnet_id)?,
        (None, Some((first, last)), false) => {
            store.start_subnet_range_lease_stats_query4(first, last)?
        }
        (None, Some((first, last)), true) => {
            store.start_subnet_range_lease_stats_query6(first, last)?
        }
        (None, None, false) => store.start_lease_stats_query4()?,
        (None, None, true) => store.start_lease_stats_query6()?,
    };

    println!("{:<10} {:<6} {:<8} {:<10}", "Subnet", "Type", "State", "Count");
    println!("{}", "-".repeat(37));
    while let Some(row) = query.next_row()? {
        println!(
            "{:<10} {:<6} {:<8} {:<10}",
            row.subnet_id, row.lease_type, row.lease_state, row.state_count
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_create(&cli.config)?;
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Commands::InitSchema => {
            let parameters = config.lease_parameters();
            if parameters.get("type").map(String::as_str) != Some("sqlite") {
                return Err(Error::InvalidConfig(
                    "init-schema only supports sqlite lease databases".into(),
                ));
            }
            let conn = SqliteConnection::open(parameters)?;
            conn.create_schema()?;
            info!("Lease schema initialized: {}", config.redacted_lease_access());
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ListLeases { v6, page_size } => {
            let store = open_store(&config)?;
            list_leases(store.as_ref(), v6, page_size)
        }
        Commands::Stats { v6, selection } => {
            let store = open_store(&config)?;
            print_stats(store.as_ref(), v6, &selection)
        }
        Commands::Reclaim { older_than } => {
            let store = open_store(&config)?;
            let v4 = store.delete_expired_reclaimed_leases4(older_than)?;
            let v6 = store.delete_expired_reclaimed_leases6(older_than)?;
            println!("Deleted {} IPv4 and {} IPv6 reclaimed lease(s).", v4, v6);
            Ok(())
        }
    }
}
