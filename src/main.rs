//! flux1090: a preamble-less Mode S / ADS-B demodulator
//!
//! Consumes a continuous IQ sample stream at 1090 MHz and emits framed
//! Mode S messages. No preamble search: every demodulated bit runs through
//! per-phase CRC shift registers, and framing is decided at every bit
//! boundary from the residue plus a cache of believed senders.

#![allow(dead_code)]

mod bits;
mod config;
mod crc;
mod demod;
mod device;
mod error;
mod fix_table;
mod icao;
mod input;
mod modes;
mod output;
mod pipeline;
mod rate;
mod registers;
mod resample;
mod ring;
mod stats;
mod stream;
mod taps;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::demod::{DemodCore, DemodOptions, DetectedFrame};
use crate::device::{CaptureDevice, DeviceConfig, DeviceKind};
use crate::input::{RingSource, SampleConverter, StreamSource};
use crate::output::{OutputFormat, OutputWriter};
use crate::pipeline::{DcRemoval, FlipSigns, FirFilter, IqPipeline, RawFormat, Stage};
use crate::rate::RateConfig;
use crate::registers::RightAligned;
use crate::stream::SampleStream;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: flux1090 -s <rate> [-u <rate>] [-d <device.ini>] [-f <taps>] [-q] [-v]");
            std::process::exit(1);
        }
    };

    // frames go to stdout; everything else to stderr
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let output_rate = match config.output_rate {
        Some(rate) => rate,
        None => match RateConfig::default_output_rate(config.input_rate) {
            Ok(rate) => {
                info!("auto-selected working rate: {} MHz", rate / 1_000_000);
                rate
            }
            Err(e) => {
                error!("{}", e);
                eprintln!("{}", rate::describe_supported());
                std::process::exit(1);
            }
        },
    };

    let rate = match RateConfig::for_pair(config.input_rate, output_rate) {
        Ok(rate) => rate,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", rate::describe_supported());
            std::process::exit(-1);
        }
    };

    info!(
        "input {} MHz, working {} MHz, ratio {}:{}, {} streams",
        rate.input_rate as f64 / 1e6,
        rate.output_rate / 1_000_000,
        rate.p,
        rate.q,
        rate.num_streams
    );

    // process-wide shutdown flag, set by SIGINT/SIGTERM and polled at
    // block boundaries
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    let device_config = match config.device_config {
        Some(ref path) => match DeviceConfig::from_file(path) {
            Ok(device_config) => Some(device_config),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    // the airspy capture path delivers raw real samples; everything else
    // defaults by rate pair
    let format = config.format.unwrap_or(match device_config.as_ref().map(|d| d.kind) {
        Some(DeviceKind::Airspy) => RawFormat::IqUint16RealRaw,
        _ => rate.default_format,
    });
    let pipeline = build_pipeline(&config, &rate, format)?;
    info!("raw format {:?}, pipeline: {}", format, pipeline.describe());
    let converter = SampleConverter::new(format, pipeline, rate.input_block());

    // frame channel and the output writer thread
    let (frame_tx, frame_rx) = bounded::<DetectedFrame>(1024);
    let out_format = if config.binary {
        OutputFormat::Binary
    } else {
        OutputFormat::Ascii
    };
    let writer_handle = thread::spawn(move || run_output(frame_rx, out_format));

    let demod: DemodCore<RightAligned> = DemodCore::new(
        rate.num_streams,
        frame_tx,
        DemodOptions {
            df11_trust_elevation: config.df11_trust_elevation,
            stats: config.stats,
        },
    );
    let mut sample_stream = SampleStream::new(rate, demod, Arc::clone(&shutdown));

    let result = if let Some(ref device_config) = device_config {
        info!("async device mode");
        run_device_mode(&mut sample_stream, device_config, &rate, converter)
    } else {
        info!("sync stdin mode");
        let stdin = io::stdin();
        let mut source = StreamSource::new(stdin.lock(), converter, rate.input_block());
        sample_stream.run(&mut source)
    };

    // the demod core owns the sender; dropping it ends the writer
    drop(sample_stream);
    writer_handle.join().ok();

    if let Err(e) = result {
        error!("stream error: {}", e);
        return Err(e.into());
    }
    info!("finished");
    Ok(())
}

fn build_pipeline(
    config: &Config,
    rate: &RateConfig,
    format: RawFormat,
) -> Result<IqPipeline, Box<dyn std::error::Error>> {
    let mut stages = Vec::new();

    // real-valued raw input needs recentering before anything else
    if format == RawFormat::IqUint16RealRaw {
        stages.push(Stage::DcRemoval(DcRemoval::new(DcRemoval::DEFAULT_ALPHA)));
        stages.push(Stage::FlipSigns(FlipSigns::default()));
    }

    if let Some(ref path) = config.taps_file {
        let taps = match taps::load_taps_file(path) {
            Ok(taps) => taps,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        };
        info!("loaded {} taps from {}", taps.len(), path.display());
        stages.push(Stage::Fir(FirFilter::new(&taps)));
    } else if config.iq_filter {
        match taps::builtin_for_rate(rate.input_rate) {
            Some(taps) => stages.push(Stage::Fir(FirFilter::new(taps))),
            None => {
                info!(
                    "no built-in taps for {} MHz, filter disabled",
                    rate.input_rate as f64 / 1e6
                );
            }
        }
    }

    Ok(IqPipeline::new(stages))
}

fn run_device_mode(
    sample_stream: &mut SampleStream<RightAligned>,
    device_config: &DeviceConfig,
    rate: &RateConfig,
    converter: SampleConverter,
) -> io::Result<()> {
    let block_bytes = converter.bytes_per_block(rate.input_block());
    let (ring_writer, ring_reader) = ring::channel::<u8>(block_bytes, 8);

    let mut device = match CaptureDevice::start(device_config, rate.input_rate, ring_writer) {
        Ok(device) => device,
        Err(e) => {
            error!("{}", e);
            return Err(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    };

    let mut source = RingSource::new(ring_reader, converter);
    let result = sample_stream.run(&mut source);
    device.stop();
    result
}

fn run_output(rx: Receiver<DetectedFrame>, format: OutputFormat) {
    let stdout = io::stdout();
    let mut writer = OutputWriter::new(stdout.lock(), format);
    while let Ok(frame) = rx.recv() {
        if writer.write_frame(&frame).is_err() {
            // downstream is gone; drain silently until the demod stops
            break;
        }
    }
}
