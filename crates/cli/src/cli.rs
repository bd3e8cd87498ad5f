use clap::Parser;

use reindex_core::config::{throughput_limit, Config, SettleMode, StoreBackend};

/// Live reindex migration scenario.
///
/// Seeds a source collection, migrates it to a destination in two phases
/// while create/update/delete traffic hits the source, and prints a
/// numbered checkpoint log showing what each phase carried over.
///
/// Every flag defaults to the environment configuration (`.env` and
/// `REINDEX_PROFILE`-prefixed variables).
#[derive(Parser, Debug)]
#[command(name = "reindex-scenario", version, about)]
pub struct CliArgs {
    /// Store backend: memory or http
    #[arg(long)]
    pub backend: Option<StoreBackend>,

    /// Elasticsearch / OpenSearch base URL (http backend)
    #[arg(long)]
    pub url: Option<String>,

    /// Source collection name
    #[arg(long)]
    pub source: Option<String>,

    /// Destination collection name
    #[arg(long)]
    pub dest: Option<String>,

    /// Number of seed documents
    #[arg(long)]
    pub documents: Option<u64>,

    /// Documents per seed bulk request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Delay between starting phase one and issuing the workload
    #[arg(long)]
    pub settle_delay_ms: Option<u64>,

    /// How to wait for the phase-one snapshot: delay, signal or signal+delay
    #[arg(long)]
    pub settle_mode: Option<SettleMode>,

    /// Bulk copy cap in docs/sec; 0 disables throttling
    #[arg(long)]
    pub throughput: Option<f64>,

    /// Id updated while phase one runs
    #[arg(long)]
    pub update_id: Option<String>,

    /// Id deleted while phase one runs
    #[arg(long)]
    pub delete_id: Option<String>,

    /// Id created while phase one runs
    #[arg(long)]
    pub create_id: Option<String>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub show_config: bool,
}

impl CliArgs {
    /// Overlay the flags that were given onto the env configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }
        if let Some(url) = &self.url {
            config.store.url = url.clone();
        }

        let scenario = &mut config.scenario;
        if let Some(source) = &self.source {
            scenario.source_collection = source.clone();
        }
        if let Some(dest) = &self.dest {
            scenario.dest_collection = dest.clone();
        }
        if let Some(documents) = self.documents {
            scenario.document_count = documents;
        }
        if let Some(batch_size) = self.batch_size {
            scenario.seed_batch_size = batch_size;
        }
        if let Some(delay) = self.settle_delay_ms {
            scenario.settle_delay_ms = delay;
        }
        if let Some(mode) = self.settle_mode {
            scenario.settle_mode = mode;
        }
        if let Some(rate) = self.throughput {
            scenario.throughput_limit = throughput_limit(rate);
        }
        if let Some(id) = &self.update_id {
            scenario.update_id = id.clone();
        }
        if let Some(id) = &self.delete_id {
            scenario.delete_id = id.clone();
        }
        if let Some(id) = &self.create_id {
            scenario.create_id = id.clone();
        }
    }
}
