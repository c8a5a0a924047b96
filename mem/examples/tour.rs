// SPDX-License-Identifier: MPL-2.0

// A walkthrough of the volume access layer over the in-memory backend: enumerate volumes, decode
// geometry, then open with retry (past injected busy failures), write a sector, and read it back.
//
// Set `RUST_LOG=debug` to watch the retry loop and backend transitions.

use anyhow::Context as _;
use volio::{Access, BlockVolume, Volume, VolumeAccessor as _};
use volio_mem::{MemAccessor, MemVolume};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let mut backend = MemAccessor::new();
    backend.add_volume(MemVolume::new("sda1", 512, 2048, 128).with_mount_point("/mnt/data"));
    backend.add_volume(MemVolume::new("sdb1", 4096, 0, 32));
    backend.init().context("failed to initialize backend")?;

    // Pretend the OS is holding the device for a moment, as auto-mounters tend to.
    backend.fail_next_opens(2);

    let names = backend.volume_names().context("failed to enumerate volumes")?;
    let accessor = volio::shared(backend);

    for name in &names {
        let mut volume = BlockVolume::new(name.clone(), accessor.clone());
        volume.update_info().context("failed to read volume geometry")?;

        let mount_point = volume.mount_point();
        println!(
            "{}: {} sectors x {} bytes from sector {}, {:?}, {}",
            volume.name(),
            volume.num_sectors(),
            volume.bytes_per_sector(),
            volume.start_sector(),
            volume.medium_kind(),
            if mount_point.is_empty() {
                "not mounted".to_owned()
            } else {
                format!("mounted at {}", mount_point)
            },
        );
    }

    let volume = Volume::new("sda1", accessor);

    // The first two attempts fail busy; the bounded retry inside `open` absorbs them.
    volume.open(Access::ReadWrite).context("failed to open volume")?;
    println!("opened sda1 (handle open: {})", volume.is_open());

    let mut sector = vec![0u8; 512];
    sector[0] = 0xeb;
    sector[510] = 0x55;
    sector[511] = 0xaa;
    volume.write_all(&sector).context("failed to write sector")?;

    volume.seek(0).context("failed to seek")?;
    let mut readback = vec![0u8; 512];
    volume.read_all(&mut readback).context("failed to read sector")?;
    println!(
        "sector 0: first byte {:#04x}, signature {:02x}{:02x}",
        readback[0], readback[510], readback[511],
    );

    volume.close().context("failed to close volume")?;

    Ok(())
}
