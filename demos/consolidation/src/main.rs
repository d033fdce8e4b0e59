use std::io::Write;

use clap::Parser;
use sugars::{rc, refcell};

use dslab_consolidation::core::config::DatacenterConfig;
use dslab_consolidation::core::migration_sink::MigrationLog;
use dslab_consolidation::core::policy::PolicyRegistry;
use dslab_consolidation::log_info;
use dslab_consolidation::simulation::DatacenterSimulation;
use dslab_power_models::PowerModelRegistry;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to datacenter config in YAML format.
    #[clap(short, long, default_value = "config.yaml")]
    config: String,

    /// Simulated time in seconds of each workload phase.
    #[clap(short, long, default_value_t = 1800.)]
    duration: f64,

    /// ID stamped into migration records.
    #[clap(long, default_value_t = 1)]
    simulation_id: u32,

    /// Path to save started migrations as CSV.
    #[clap(long)]
    migrations_csv: Option<String>,

    /// Path to save simulation summary as JSON.
    #[clap(long)]
    summary: Option<String>,
}

fn init_logger() {
    use env_logger::Builder;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn main() {
    init_logger();
    let args = Args::parse();

    let config = DatacenterConfig::from_file(&args.config).unwrap_or_else(|e| panic!("{}", e));
    let power_models = PowerModelRegistry::new();
    let policies = PolicyRegistry::new();
    config
        .validate(&power_models, &policies)
        .unwrap_or_else(|e| panic!("{}", e));

    let migrations = rc!(refcell!(MigrationLog::new()));
    let mut sim =
        DatacenterSimulation::from_config(config, args.simulation_id, &power_models, &policies, migrations.clone())
            .unwrap_or_else(|e| panic!("{}", e));

    // phase 1: initial placement settles
    sim.step_for_duration(args.duration);

    // phase 2: batch VMs double their demand
    let batch_vms: Vec<(u32, f64)> = sim
        .pool()
        .vms()
        .filter(|vm| vm.tenant == "batch")
        .map(|vm| (vm.id, vm.mips))
        .collect();
    for (vm_id, mips) in batch_vms {
        if let Err(verdict) = sim.update_vm_mips(vm_id, mips * 2.) {
            log_info!(sim, "vm #{} can't grow: {}", vm_id, verdict);
        }
    }
    sim.step_for_duration(args.duration);

    // phase 3: web VMs leave, the rest of load can be consolidated
    let web_vms: Vec<u32> = sim
        .pool()
        .vms()
        .filter(|vm| vm.tenant == "web")
        .map(|vm| vm.id)
        .collect();
    for vm_id in web_vms.into_iter().step_by(2) {
        sim.release_vm(vm_id);
    }
    sim.step_for_duration(args.duration);

    let summary = sim.summary();
    println!(
        "time: {:.1} s, active hosts: {}/{}, placed vms: {}/{}, migrations: {} started, {} completed, energy: {:.3} kWh",
        summary.time,
        summary.active_hosts,
        summary.hosts,
        summary.placed_vms,
        summary.vms,
        summary.migrations_started,
        summary.migrations_completed,
        summary.energy_consumed / 3.6e6
    );

    if let Some(path) = args.migrations_csv {
        migrations
            .borrow()
            .save_csv(&path)
            .unwrap_or_else(|e| panic!("Can't save migrations to {}: {}", path, e));
    }
    if let Some(path) = args.summary {
        let data = serde_json::to_string_pretty(&summary).unwrap();
        std::fs::write(&path, data).unwrap_or_else(|e| panic!("Can't save summary to {}: {}", path, e));
    }
}
