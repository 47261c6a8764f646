// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fsbench alloc` command - Show the resource id layout for a run size.

use std::path::{Path, PathBuf};

use fsbench_core::alloc::join_ids;
use fsbench_core::{allocate, ServerLaunchArgs};

pub async fn execute(
    workers: u32,
    apps: u32,
    stride: u32,
    core_base: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let space = match allocate(workers, apps, core_base, stride) {
        Ok(space) => space,
        Err(e) => {
            eprintln!("✗ Allocation rejected:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ {} workers, {} app slots, stride {}", workers, apps, stride);
    println!();
    println!("Core affinity:  {}", space.affinity_arg());
    println!("SHM offsets:    {}", space.offsets_arg());
    println!();
    println!("Slot key lists:");
    for slot in 0..space.num_apps() {
        if let Some(keys) = space.slot_key_list(slot) {
            println!("  app {:>3}: {}", slot, join_ids(&keys));
        }
    }

    let args = ServerLaunchArgs {
        space,
        device_config: PathBuf::from("/tmp/spdk.conf"),
        server_config: PathBuf::from("/tmp/fsp.conf"),
    };
    println!();
    println!("Server argv:");
    println!("  {}", args.argv(Path::new("/tmp/cfs_exit")).join(" "));
    Ok(())
}
