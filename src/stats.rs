//! Simulation statistics collection and reporting.
//!
//! Gathers the per-tile cache counters, the directory counters of home tiles
//! and the DRAM traffic into one serializable snapshot.

use crate::common::TileId;
use crate::core::units::cache::CacheCounters;
use crate::directory::DirectoryCounters;
use crate::soc::memory::controller::DramCounters;
use serde::Serialize;

/// Counters of one tile.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TileStats {
    pub tile: TileId,
    pub l1_i: CacheCounters,
    pub l1_d: CacheCounters,
    pub l2: CacheCounters,
    /// Present on home tiles only.
    pub directory: Option<DirectoryCounters>,
    pub dram: Option<DramCounters>,
}

/// Snapshot of a whole system.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SimStats {
    pub host_seconds: f64,
    pub messages_sent: u64,
    pub tiles: Vec<TileStats>,
}

impl SimStats {
    /// Sum of the counters of one cache level over all tiles.
    pub fn cache_totals(&self, level: impl Fn(&TileStats) -> CacheCounters) -> CacheCounters {
        self.tiles.iter().map(level).fold(CacheCounters::default(), |acc, c| CacheCounters {
            hits: acc.hits + c.hits,
            misses: acc.misses + c.misses,
            evictions: acc.evictions + c.evictions,
            invalidations: acc.invalidations + c.invalidations,
        })
    }

    /// Sum of the directory counters over all home tiles.
    pub fn directory_totals(&self) -> DirectoryCounters {
        self.tiles
            .iter()
            .filter_map(|t| t.directory)
            .fold(DirectoryCounters::default(), |acc, d| DirectoryCounters {
                ex_requests: acc.ex_requests + d.ex_requests,
                sh_requests: acc.sh_requests + d.sh_requests,
                nullify_requests: acc.nullify_requests + d.nullify_requests,
                invalidations_sent: acc.invalidations_sent + d.invalidations_sent,
                broadcasts_sent: acc.broadcasts_sent + d.broadcasts_sent,
                flushes_sent: acc.flushes_sent + d.flushes_sent,
                writebacks_sent: acc.writebacks_sent + d.writebacks_sent,
                entry_evictions: acc.entry_evictions + d.entry_evictions,
            })
    }

    /// Sum of DRAM reads and writes over all home tiles.
    pub fn dram_totals(&self) -> DramCounters {
        self.tiles
            .iter()
            .filter_map(|t| t.dram)
            .fold(DramCounters::default(), |acc, d| DramCounters {
                reads: acc.reads + d.reads,
                writes: acc.writes + d.writes,
            })
    }

    /// Prints a formatted summary of all simulation statistics.
    pub fn print(&self) {
        let l1_i = self.cache_totals(|t| t.l1_i);
        let l1_d = self.cache_totals(|t| t.l1_d);
        let l2 = self.cache_totals(|t| t.l2);
        let dir = self.directory_totals();
        let dram = self.dram_totals();

        println!("\n==========================================================");
        println!("TILE COHERENCE SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", self.host_seconds);
        println!("sim_tiles                {}", self.tiles.len());
        println!("sim_messages             {}", self.messages_sent);
        println!("----------------------------------------------------------");
        println!("MEMORY HIERARCHY");

        let print_cache = |name: &str, c: &CacheCounters| {
            let total = c.hits + c.misses;
            let rate = if total > 0 {
                (c.misses as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            println!(
                "  {:<6} accesses: {:<10} | hits: {:<10} | miss_rate: {:.2}% | evictions: {} | invalidations: {}",
                name, total, c.hits, rate, c.evictions, c.invalidations
            );
        };

        print_cache("L1-I", &l1_i);
        print_cache("L1-D", &l1_d);
        print_cache("L2", &l2);
        println!("----------------------------------------------------------");
        println!("DIRECTORY");
        println!("  req.exclusive          {}", dir.ex_requests);
        println!("  req.shared             {}", dir.sh_requests);
        println!("  req.nullify            {}", dir.nullify_requests);
        println!("  cmd.invalidate         {}", dir.invalidations_sent);
        println!("  cmd.broadcast          {}", dir.broadcasts_sent);
        println!("  cmd.flush              {}", dir.flushes_sent);
        println!("  cmd.writeback          {}", dir.writebacks_sent);
        println!("  entry.evictions        {}", dir.entry_evictions);
        println!("----------------------------------------------------------");
        println!("DRAM");
        println!("  dram.reads             {}", dram.reads);
        println!("  dram.writes            {}", dram.writes);
        println!("----------------------------------------------------------");
        println!("PER TILE");
        for t in &self.tiles {
            println!(
                "  tile {:<3} L1-I {}/{}  L1-D {}/{}  L2 {}/{}  (hits/misses){}",
                t.tile,
                t.l1_i.hits,
                t.l1_i.misses,
                t.l1_d.hits,
                t.l1_d.misses,
                t.l2.hits,
                t.l2.misses,
                if t.directory.is_some() { "  [home]" } else { "" }
            );
        }
        println!("==========================================================");
    }
}
