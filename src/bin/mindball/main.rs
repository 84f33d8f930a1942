//! Mindball: move a ball with your brain waves.
//!
//! Example:
//! cargo run -- play --device /dev/ttyACM0 --device /dev/ttyACM1
//! cargo run -- --simulate
//! cargo run -- capture --seconds 5 -d /dev/ttyACM0 --baud 115200

use clap::Parser;
use log::info;
use mindball::{
    args::{CaptureCommand, CommandTask, MindballArgs, PlayCommand},
    audio_cue::WavCue,
    capture::capture,
    config::{ChannelConfig, MonitorConfig},
    device::{ChunkReader, SerialDevice, SyntheticDevice},
    gui::{self, select_devices},
    monitor::Monitor,
};
use std::{
    error::Error,
    io::{self, Write},
    time::Duration,
};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MindballArgs::parse();
    let config = load_config(&args)?;

    match args.command.unwrap_or(CommandTask::Play(PlayCommand::default())) {
        CommandTask::Play(cmd) => play(config, cmd),
        CommandTask::Capture(cmd) => run_capture(&config, cmd),
        CommandTask::Devices => {
            for port in SerialDevice::available_ports()? {
                println!("{}", port.display());
            }
            Ok(())
        }
    }
}

/// The config file, or the defaults, with the command line on top.
fn load_config(args: &MindballArgs) -> Result<MonitorConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_path(path)?,
        None if args.devices.len() == 1 => MonitorConfig::single_channel(&args.devices[0]),
        None => MonitorConfig::default(),
    };

    if args.devices.len() > 2 {
        return Err(format!("at most two devices, got {}", args.devices.len()).into());
    }
    if !args.devices.is_empty() {
        config.channels = args
            .devices
            .iter()
            .enumerate()
            .map(|(i, device)| ChannelConfig {
                device: device.clone(),
                ..config.channels.get(i).cloned().unwrap_or_default()
            })
            .collect();
    }
    if let Some(baud) = args.baud {
        config.channels.iter_mut().for_each(|ch| ch.baud_rate = baud);
    }
    config.simulate |= args.simulate;

    config.validate()?;
    Ok(config)
}

fn play(mut config: MonitorConfig, cmd: PlayCommand) -> Result<(), Box<dyn Error>> {
    if cmd.pick && !config.simulate {
        let ports = SerialDevice::available_ports()?;
        let Some(picked) = select_devices(ports, config.channels.len())? else {
            info!("no devices picked");
            return Ok(());
        };
        config.channels.truncate(picked.len());
        for (ch, port) in config.channels.iter_mut().zip(picked) {
            ch.device = port.to_string_lossy().into_owned();
        }
    }

    let mut monitor = Monitor::new(config, Box::new(WavCue::new()))?;
    gui::arena::run(&mut monitor)?;
    monitor.stop();
    Ok(())
}

fn run_capture(config: &MonitorConfig, cmd: CaptureCommand) -> Result<(), Box<dyn Error>> {
    if !(cmd.seconds > 0.0 && cmd.seconds.is_finite()) {
        return Err(format!("capture length must be positive, got {}", cmd.seconds).into());
    }
    let channel = config.channels.first().cloned().unwrap_or_default();
    let mut reader: Box<dyn ChunkReader> = if config.simulate {
        Box::new(SyntheticDevice::new(channel.baud_rate))
    } else {
        Box::new(SerialDevice::open(
            &channel.device,
            channel.baud_rate,
            config.read_timeout(),
        )?)
    };

    info!("capturing '{}' for {}s", channel.device, cmd.seconds);
    let samples = capture(
        &mut reader,
        Duration::from_secs_f64(cmd.seconds),
        config.chunk_size,
    )?;

    let mut out = io::stdout().lock();
    for sample in samples {
        writeln!(out, "{}", sample.value())?;
    }
    Ok(())
}
