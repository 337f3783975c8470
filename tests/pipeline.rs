//! End-to-end pipeline scenarios.
use std::time::{Duration, Instant};

use anyhow::Result;

use panelsim::Layer;
use panelsim::auth::{AuthVerifier, SpiCommand, SpiTransaction, Verdict};
use panelsim::host::HostConfig;
use panelsim::mcu::McuConfig;
use panelsim::panel::{PanelConfig, Pattern};
use panelsim::pipeline::{FaultConfig, PipelineBuilder, Summary};
use panelsim::storage::TiffWriter;

fn counter_panel(width: u32, height: u32) -> PanelConfig {
    PanelConfig {
        width,
        height,
        seed: 42,
        ..Default::default()
    }
}

#[test]
fn counter_frame_1024_is_bit_exact_end_to_end() -> Result<()> {
    let mut pipeline = PipelineBuilder::new()
        .panel(counter_panel(1024, 1024))
        .build()?;
    let result = pipeline.run_frame(1)?;
    assert!(result.success);
    // FS + 1024 lines + FE.
    assert_eq!(
        result.checkpoints[1].summary,
        Summary::Packets { count: 1026 }
    );
    let frame = result.final_frame.unwrap();
    for r in (0..1024).step_by(97) {
        for c in (0..1024).step_by(89) {
            assert_eq!(frame.pixel(r, c), ((r * 1024 + c) % 65536) as u16);
        }
    }
    assert_eq!(pipeline.mcu().stats().crc_errors, 0);
    assert_eq!(pipeline.host().stats().crc_errors, 0);
    Ok(())
}

#[test]
fn noisy_flat_field_512_reproduces_its_hash() -> Result<()> {
    let config = PanelConfig {
        width: 512,
        height: 512,
        pattern: Pattern::FlatField { baseline: 0x8000 },
        noise_sigma: 100.0,
        seed: 42,
        ..Default::default()
    };
    let run = |cfg: PanelConfig| -> Result<String> {
        let mut pipeline = PipelineBuilder::new().panel(cfg).build()?;
        let result = pipeline.run_frame(1)?;
        assert!(result.success);
        assert_eq!(pipeline.mcu().incomplete_frames(), 0);
        Ok(result.final_frame.unwrap().pixel_hash())
    };
    // The pipeline must neither disturb the pixels nor depend on run
    // order, so the end-to-end hash is its own golden value.
    assert_eq!(run(config.clone())?, run(config)?);
    Ok(())
}

// Full production geometry. Slow in debug builds, so opt in with
// `cargo test -- --ignored`.
#[test]
#[ignore]
fn noisy_flat_field_2048_full_geometry() -> Result<()> {
    let config = PanelConfig {
        width: 2048,
        height: 2048,
        pattern: Pattern::FlatField { baseline: 0x8000 },
        noise_sigma: 100.0,
        seed: 42,
        ..Default::default()
    };
    let mut pipeline = PipelineBuilder::new().panel(config).build()?;
    let result = pipeline.run_frame(1)?;
    assert!(result.success);
    assert_eq!(pipeline.mcu().incomplete_frames(), 0);
    Ok(())
}

#[test]
fn production_widths_round_trip() -> Result<()> {
    for width in [256, 512, 1024, 2048] {
        let mut pipeline = PipelineBuilder::new()
            .panel(counter_panel(width, 16))
            .build()?;
        let result = pipeline.run_frame(1)?;
        assert!(result.success, "width {width}");
    }
    Ok(())
}

#[test]
fn tall_frame_exceeds_64_line_bitmap() -> Result<()> {
    let mut pipeline = PipelineBuilder::new()
        .panel(counter_panel(64, 2048))
        .build()?;
    let result = pipeline.run_frame(1)?;
    assert!(result.success);
    assert_eq!(
        result.checkpoints[1].summary,
        Summary::Packets { count: 2050 }
    );
    Ok(())
}

#[test]
fn header_corruption_is_discarded_and_accounted() -> Result<()> {
    let mut pipeline = PipelineBuilder::new()
        .panel(PanelConfig {
            width: 256,
            height: 256,
            pattern: Pattern::Checkerboard,
            ..Default::default()
        })
        .mcu(McuConfig {
            rows: 256,
            cols: 256,
            max_payload: 4096,
            ..Default::default()
        })
        .faults(FaultConfig {
            seed: 17,
            header_corrupt_probability: 0.1,
            ..Default::default()
        })
        .build()?;
    let result = pipeline.run_frame(1)?;
    // Every corrupted header shows up as exactly one host-side CRC error.
    assert_eq!(
        pipeline.host().stats().crc_errors,
        result.faults.corrupted_headers
    );
    if !result.success {
        // Coverage was incomplete; the abandoned slot must time out.
        assert_eq!(pipeline.host().open_slots(), 1);
        pipeline.tick(Instant::now() + Duration::from_secs(3));
        assert_eq!(pipeline.host().open_slots(), 0);
        assert_eq!(pipeline.host().stats().timeouts, 1);
    }
    Ok(())
}

#[test]
fn continuous_run_300_frames_under_one_percent_drops() -> Result<()> {
    let mut pipeline = PipelineBuilder::new()
        .panel(counter_panel(256, 256))
        .build()?;
    let results = pipeline.run(300)?;
    let failed = results.iter().filter(|r| !r.success).count();
    assert!(failed * 100 < results.len(), "{failed} of 300 frames failed");
    // No faults were injected, so every frame must be bit exact.
    assert_eq!(failed, 0);
    Ok(())
}

#[test]
fn light_packet_loss_over_1000_frames() -> Result<()> {
    let mut pipeline = PipelineBuilder::new()
        .panel(counter_panel(64, 64))
        .faults(FaultConfig {
            seed: 2024,
            packet_loss_probability: 0.001,
            ..Default::default()
        })
        .host(HostConfig {
            timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .build()?;
    let mut completed = 0usize;
    for n in 1..=1000u32 {
        if pipeline.run_frame(n)?.success {
            completed += 1;
        }
        // Let abandoned slots age out instead of accumulating.
        pipeline.tick(Instant::now() + Duration::from_secs(1));
    }
    assert!(completed >= 990, "only {completed} of 1000 frames completed");
    assert_eq!(pipeline.host().open_slots(), 0);
    Ok(())
}

#[test]
fn storage_writer_persists_every_frame() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut pipeline = PipelineBuilder::new()
        .panel(counter_panel(32, 32))
        .writer(Box::new(TiffWriter), dir.path().to_path_buf())
        .build()?;
    let results = pipeline.run(3)?;
    assert!(results.iter().all(|r| r.success));
    for n in 1..=3 {
        let path = dir.path().join(format!("frame_{n:06}.tiff"));
        let data = std::fs::read(&path)?;
        assert_eq!(&data[0..2], b"II");
        assert_eq!(data.len(), 174 + 32 * 32 * 2);
    }
    Ok(())
}

#[test]
fn signed_configure_command() {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let key = b"integration-psk";
    let txn = SpiTransaction {
        command: SpiCommand::Write,
        data: b"mode=configure exposure_us=100".to_vec(),
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(&txn.canonical_bytes());
    let tag = mac.finalize().into_bytes();

    let mut verifier = AuthVerifier::new(&key[..]);
    assert_eq!(
        verifier.verify_transaction(&txn, tag.as_slice()),
        Verdict::Accepted
    );

    let mut flipped = tag.as_slice().to_vec();
    flipped[7] ^= 0x10;
    assert_eq!(verifier.verify_transaction(&txn, &flipped), Verdict::Rejected);
    assert_eq!(verifier.verify_transaction(&txn, &[]), Verdict::Rejected);
    assert_eq!(verifier.counters(), (1, 2));
}
