//! Offline rendering command.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, ValueEnum};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use scriptnode::{DspNetwork, NetworkContext};
use scriptnode_config::EngineConfig;
use snex_core::{AudioBuffer, HiseEvent};

use super::common::{holder, load_network, parse_key_val};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Signal {
    /// All zeros
    Silence,
    /// A single full-scale sample at the start
    Impulse,
    /// A 440 Hz sine at half scale
    Sine,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Network description file (TOML or JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Input WAV file; a test signal is rendered without one
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Test signal used without an input file
    #[arg(long, value_enum, default_value = "impulse")]
    signal: Signal,

    /// Length of the test signal in seconds
    #[arg(long, default_value = "1.0")]
    duration: f64,

    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of project networks, overrides the configuration
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Sample rate in Hz, overrides the configuration
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Processing block size, overrides the configuration
    #[arg(long)]
    block_size: Option<usize>,

    /// Channel count, overrides the configuration
    #[arg(long)]
    channels: Option<usize>,

    /// Network parameter values (e.g., "Level=0.5")
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, String)>,

    /// MIDI note sent before rendering
    #[arg(long)]
    note: Option<u8>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if ![16, 24, 32].contains(&args.bit_depth) {
        anyhow::bail!("Unsupported bit depth {} (expected 16, 24 or 32)", args.bit_depth);
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let input = match &args.input {
        Some(path) => {
            let (channels, sample_rate) = read_input(path)?;
            config.sample_rate = f64::from(sample_rate);
            Some(channels)
        }
        None => None,
    };

    if let Some(sample_rate) = args.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if let Some(channels) = args.channels {
        config.num_channels = channels;
    }
    if args.project.is_some() {
        config.network_dir = args.project.clone();
    }
    config.validate()?;

    let holder = holder(config.network_dir.as_deref())?;
    let tree = load_network(&args.file)?;
    config.polyphonic = tree.polyphonic;
    let network = DspNetwork::new(tree, NetworkContext::clone(&holder.context()))?;

    for (id, value) in &args.param {
        let value: f64 = value
            .parse()
            .with_context(|| format!("Invalid value for parameter '{id}': '{value}'"))?;
        network.set_network_parameter_by_id(id, value)?;
    }

    network.prepare(&config.specs());
    let exceptions = network.exceptions();
    for (node, error) in exceptions.iter() {
        tracing::warn!(node = %node, "{error}");
    }

    let voice = args
        .note
        .and_then(|note| network.handle_hise_event(&mut HiseEvent::note_on(1, note, 100)));

    let num_channels = config.num_channels;
    let source = match input {
        Some(channels) => channels,
        None => {
            let length = (args.duration.max(0.0) * config.sample_rate) as usize;
            vec![test_signal(args.signal, length, config.sample_rate)]
        }
    };
    let length = source.iter().map(Vec::len).max().unwrap_or(0);

    println!(
        "Rendering {} ({} samples, {} Hz, {} channels)...",
        network.id(),
        length,
        config.sample_rate,
        num_channels
    );

    let output = render(&network, voice, &source, num_channels, config.block_size);
    let spec = WavSpec {
        channels: num_channels as u16,
        sample_rate: config.sample_rate as u32,
        bits_per_sample: args.bit_depth,
        sample_format: if args.bit_depth == 32 { SampleFormat::Float } else { SampleFormat::Int },
    };
    write_output(&args.output, &output, spec)?;

    let peak = output.to_interleaved().iter().fold(0.0f32, |m, s| m.max(s.abs()));
    println!("Wrote {} (peak {:.4})", args.output.display(), peak);
    Ok(())
}

/// Runs `source` through the network block by block.
///
/// Source channels are repeated when the network has more channels.
/// Renders `source` block by block, inside `voice` when a note started one.
fn render(
    network: &DspNetwork,
    voice: Option<usize>,
    source: &[Vec<f32>],
    num_channels: usize,
    block_size: usize,
) -> AudioBuffer {
    let length = source.iter().map(Vec::len).max().unwrap_or(0);
    let mut output = AudioBuffer::new(num_channels, length);
    let mut block = AudioBuffer::new(num_channels, block_size);

    let mut start = 0;
    while start < length {
        let len = block_size.min(length - start);
        block.clear();
        for c in 0..num_channels {
            if let Some(channel) = source.get(c % source.len().max(1)) {
                let end = (start + len).min(channel.len());
                if start < end {
                    block.channel_mut(c)[..end - start].copy_from_slice(&channel[start..end]);
                }
            }
        }

        match voice {
            Some(v) => network.process_voice(v, &mut block.process_data(len)),
            None => network.process(&mut block.process_data(len)),
        }

        for c in 0..num_channels {
            output.channel_mut(c)[start..start + len].copy_from_slice(&block.channel(c)[..len]);
        }
        start += len;
    }
    output
}

fn test_signal(signal: Signal, length: usize, sample_rate: f64) -> Vec<f32> {
    match signal {
        Signal::Silence => vec![0.0; length],
        Signal::Impulse => {
            let mut samples = vec![0.0; length];
            if let Some(first) = samples.first_mut() {
                *first = 1.0;
            }
            samples
        }
        Signal::Sine => (0..length)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * 440.0 * i as f64 / sample_rate;
                (0.5 * phase.sin()) as f32
            })
            .collect(),
    }
}

/// Reads a WAV file into per-channel samples and its sample rate.
fn read_input(path: &Path) -> anyhow::Result<(Vec<Vec<f32>>, u32)> {
    let reader = WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let buffer = AudioBuffer::from_interleaved(&samples, channels);
    let split = (0..channels).map(|c| buffer.channel(c).to_vec()).collect();
    Ok((split, spec.sample_rate))
}

fn write_output(path: &Path, buffer: &AudioBuffer, spec: WavSpec) -> anyhow::Result<()> {
    let mut writer = WavWriter::create(path, spec).with_context(|| format!("failed to create {}", path.display()))?;

    if spec.sample_format == SampleFormat::Float {
        for sample in buffer.to_interleaved() {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
        for sample in buffer.to_interleaved() {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use scriptnode_config::{NetworkTree, NodeTree, ParameterTree};

    use super::*;

    #[test]
    fn renders_across_block_boundaries() {
        let tree = NetworkTree::new("main")
            .with_parameter(ParameterTree::new("Level", 0.5).with_connection("mul", "Value"))
            .with_root(NodeTree::new("container.chain", "main").with_child(NodeTree::new("math.mul", "mul")));
        let network = DspNetwork::new(tree, NetworkContext::default()).unwrap();
        network.prepare(&EngineConfig::default().specs().with_block_size(4));

        let source = vec![vec![1.0; 10]];
        let output = render(&network, None, &source, 2, 4);
        assert_eq!(output.num_samples(), 10);
        assert_eq!(output.channel(0), &[0.5; 10]);
        assert_eq!(output.channel(1), &[0.5; 10]);
    }

    #[test]
    fn impulse_has_one_sample() {
        let impulse = test_signal(Signal::Impulse, 4, 44100.0);
        assert_eq!(impulse, [1.0, 0.0, 0.0, 0.0]);
        assert!(test_signal(Signal::Impulse, 0, 44100.0).is_empty());
    }
}
