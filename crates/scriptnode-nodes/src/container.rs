//! Container nodes.
//!
//! A [`Container`] owns child [`NodeBase`] values and decides how they see
//! the signal. The routing is picked by [`ContainerKind`]:
//!
//! | Kind | Children | Signal |
//! |------|----------|--------|
//! | chain | in series | in place |
//! | split | in parallel | each child gets a copy, outputs are summed |
//! | multi | in parallel | channels are distributed among the children |
//! | frame(N) | in series | one frame at a time, needs N channels |
//! | fix-block(N) | in series | blocks of N samples |
//! | modchain | in series | mono copy of the first channel, audio untouched |
//! | oversample(F) | in series | F times the sample rate and block size |
//!
//! Every buffer a container needs is allocated in `prepare`.

use std::fmt;

use snex_core::{
    AudioBuffer, ErrorCode, HiseEvent, MAX_CHANNELS, NodeError, PrepareSpecs, ProcessData,
};

use crate::base::{NodeBase, PrepareContext};

/// Routing of a [`Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Children in series.
    Chain,
    /// Children in parallel on copies of the input, outputs summed.
    Split,
    /// Channels split evenly among the children.
    Multi,
    /// Frame processing with a fixed channel count.
    Frame(usize),
    /// Block processing with a fixed block size.
    FixBlock(usize),
    /// Control-rate children on a mono signal.
    ModChain,
    /// Oversampling by a factor of 2 or 4.
    Oversample(usize),
}

impl ContainerKind {
    /// Every block size a fix-block container can be created with.
    pub const FIX_BLOCK_SIZES: [usize; 6] = [8, 16, 32, 64, 128, 256];

    /// Every factor an oversampling container can be created with.
    pub const OVERSAMPLING_FACTORS: [usize; 2] = [2, 4];

    /// Channel counts of frame containers.
    pub const FRAME_CHANNELS: [usize; 2] = [1, 2];

    /// Kind from a factory path (`container.chain`, `container.fix32_block`,
    /// `container.oversample4x`...).
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.strip_prefix("container.")?;
        match name {
            "chain" => return Some(ContainerKind::Chain),
            "split" => return Some(ContainerKind::Split),
            "multi" => return Some(ContainerKind::Multi),
            "modchain" => return Some(ContainerKind::ModChain),
            _ => {}
        }

        if let Some(n) = name.strip_prefix("frame") {
            let channels = n.parse().ok()?;
            return Self::FRAME_CHANNELS
                .contains(&channels)
                .then_some(ContainerKind::Frame(channels));
        }
        if let Some(n) = name.strip_prefix("fix").and_then(|s| s.strip_suffix("_block")) {
            let size = n.parse().ok()?;
            return Self::FIX_BLOCK_SIZES
                .contains(&size)
                .then_some(ContainerKind::FixBlock(size));
        }
        if let Some(n) = name.strip_prefix("oversample").and_then(|s| s.strip_suffix('x')) {
            let factor = n.parse().ok()?;
            return Self::OVERSAMPLING_FACTORS
                .contains(&factor)
                .then_some(ContainerKind::Oversample(factor));
        }
        None
    }

    /// Factory path of this kind.
    pub fn path(self) -> String {
        match self {
            ContainerKind::Chain => "container.chain".into(),
            ContainerKind::Split => "container.split".into(),
            ContainerKind::Multi => "container.multi".into(),
            ContainerKind::Frame(n) => format!("container.frame{n}"),
            ContainerKind::FixBlock(n) => format!("container.fix{n}_block"),
            ContainerKind::ModChain => "container.modchain".into(),
            ContainerKind::Oversample(f) => format!("container.oversample{f}x"),
        }
    }

    /// Factory paths of every kind.
    pub fn all_paths() -> Vec<String> {
        let mut paths: Vec<String> = [
            ContainerKind::Chain,
            ContainerKind::Split,
            ContainerKind::Multi,
            ContainerKind::ModChain,
        ]
        .iter()
        .map(|k| k.path())
        .collect();
        paths.extend(Self::FRAME_CHANNELS.iter().map(|n| ContainerKind::Frame(*n).path()));
        paths.extend(Self::FIX_BLOCK_SIZES.iter().map(|n| ContainerKind::FixBlock(*n).path()));
        paths.extend(
            Self::OVERSAMPLING_FACTORS
                .iter()
                .map(|f| ContainerKind::Oversample(*f).path()),
        );
        paths
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// FIR order of the decimation filter (taps = order + 1).
const FILTER_ORDER: usize = 15;
const FILTER_TAPS: usize = FILTER_ORDER + 1;

/// Half-band lowpass for 2x decimation (windowed sinc, Kaiser window).
#[allow(clippy::excessive_precision, clippy::unreadable_literal)]
#[rustfmt::skip]
static COEFFS_2X: [f32; FILTER_TAPS] = [
    -0.00152541,  0.00000000,  0.01309369,  0.00000000,
    -0.05738920,  0.00000000,  0.29581875,  0.50000434,
     0.29581875,  0.00000000, -0.05738920,  0.00000000,
     0.01309369,  0.00000000, -0.00152541,  0.00000000,
];

/// Lowpass for 4x decimation, cutoff at 0.2 of the oversampled Nyquist.
#[allow(clippy::excessive_precision, clippy::unreadable_literal)]
#[rustfmt::skip]
static COEFFS_4X: [f32; FILTER_TAPS] = [
    0.0018645282, 0.0068257641, 0.0172712655, 0.0342604001,
    0.0571166576, 0.0830896230, 0.1078345458, 0.1260221675,
    0.1332946246, 0.1260221675, 0.1078345458, 0.0830896230,
    0.0571166576, 0.0342604001, 0.0172712655, 0.0068257641,
];

/// `(first channel, channel count)` of every child of a multi container.
///
/// Channels are split evenly; the last child takes the remainder.
fn multi_layout(num_children: usize, channels: usize) -> impl Iterator<Item = (usize, usize)> {
    let n = num_children.max(1);
    let per_child = channels / n;
    (0..num_children).map(move |i| {
        let start = i * per_child;
        let count = if i + 1 == n { channels - start } else { per_child };
        (start, count)
    })
}

/// Up/down sampling state of one channel.
#[derive(Debug, Clone, Copy)]
struct ResamplerState {
    previous: f32,
    delay: [f32; FILTER_TAPS],
}

impl Default for ResamplerState {
    fn default() -> Self {
        Self {
            previous: 0.0,
            delay: [0.0; FILTER_TAPS],
        }
    }
}

impl ResamplerState {
    /// Linear interpolation from the previous input to `input`.
    #[inline]
    fn upsample(&mut self, input: f32, out: &mut [f32]) {
        let step = 1.0 / out.len() as f32;
        for (i, o) in out.iter_mut().enumerate() {
            let t = (i as f32 + 1.0) * step;
            *o = self.previous + t * (input - self.previous);
        }
        self.previous = input;
    }

    /// Feeds `input` through the filter and returns the last output.
    #[inline]
    fn downsample(&mut self, input: &[f32], coeffs: &[f32; FILTER_TAPS]) -> f32 {
        for s in input {
            self.delay.copy_within(0..FILTER_TAPS - 1, 1);
            self.delay[0] = *s;
        }
        self.delay.iter().zip(coeffs).map(|(d, c)| d * c).sum()
    }
}

/// Child nodes plus the buffers their routing needs.
pub struct Container {
    kind: ContainerKind,
    children: Vec<NodeBase>,
    /// Input copy of split, mono signal of modchain, oversampled block.
    scratch: AudioBuffer,
    /// Per-child signal of split.
    work: AudioBuffer,
    resamplers: Vec<ResamplerState>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("kind", &self.kind)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// A container with `children` in processing order.
    pub fn new(kind: ContainerKind, children: Vec<NodeBase>) -> Self {
        Self {
            kind,
            children,
            scratch: AudioBuffer::default(),
            work: AudioBuffer::default(),
            resamplers: Vec::new(),
        }
    }

    /// Routing.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Child nodes.
    pub fn children(&self) -> &[NodeBase] {
        &self.children
    }

    /// Mutable child nodes.
    pub fn children_mut(&mut self) -> &mut [NodeBase] {
        &mut self.children
    }

    /// Prepares the children with the specs this routing gives them.
    pub fn prepare(&mut self, specs: &PrepareSpecs, ctx: &mut PrepareContext<'_>) -> Result<(), NodeError> {
        match self.kind {
            ContainerKind::Chain => {
                for c in &mut self.children {
                    c.prepare(specs, &mut ctx.child());
                }
            }
            ContainerKind::Split => {
                self.scratch.set_size(specs.num_channels, specs.block_size);
                self.work.set_size(specs.num_channels, specs.block_size);
                for c in &mut self.children {
                    c.prepare(specs, &mut ctx.child());
                }
            }
            ContainerKind::Multi => {
                let channels = specs.num_channels;
                if channels > MAX_CHANNELS {
                    return Err(NodeError::new(
                        ErrorCode::ChannelMismatch,
                        MAX_CHANNELS as i32,
                        channels as i32,
                    ));
                }
                if self.children.len() > channels {
                    return Err(NodeError::new(
                        ErrorCode::TooManyChildNodes,
                        channels as i32,
                        self.children.len() as i32,
                    ));
                }
                let layout = multi_layout(self.children.len(), channels);
                for (c, (_, count)) in self.children.iter_mut().zip(layout) {
                    c.prepare(&specs.clone().with_num_channels(count), &mut ctx.child());
                }
            }
            ContainerKind::Frame(n) => {
                if specs.num_channels != n {
                    return Err(NodeError::new(
                        ErrorCode::ChannelMismatch,
                        n as i32,
                        specs.num_channels as i32,
                    ));
                }
                let child_specs = specs.clone().with_block_size(1);
                for c in &mut self.children {
                    c.prepare(&child_specs, &mut ctx.frame());
                }
            }
            ContainerKind::FixBlock(n) => {
                if !ctx.in_frame && specs.block_size % n != 0 {
                    return Err(NodeError::new(
                        ErrorCode::IllegalBlockSize,
                        n as i32,
                        specs.block_size as i32,
                    ));
                }
                let child_specs = specs.clone().with_block_size(n.min(specs.block_size));
                for c in &mut self.children {
                    c.prepare(&child_specs, &mut ctx.child());
                }
            }
            ContainerKind::ModChain => {
                self.scratch.set_size(1, specs.block_size);
                let child_specs = specs.clone().with_num_channels(1);
                for c in &mut self.children {
                    c.prepare(&child_specs, &mut ctx.child());
                }
            }
            ContainerKind::Oversample(factor) => {
                if ctx.in_frame {
                    return Err(NodeError::simple(ErrorCode::IllegalFrameCall));
                }
                self.scratch.set_size(specs.num_channels, specs.block_size * factor);
                self.resamplers = vec![ResamplerState::default(); specs.num_channels];
                let child_specs = specs
                    .clone()
                    .with_sample_rate(specs.sample_rate * factor as f64)
                    .with_block_size(specs.block_size * factor);
                for c in &mut self.children {
                    c.prepare(&child_specs, &mut ctx.child());
                }
            }
        }
        Ok(())
    }

    /// Processes a block through the children.
    pub fn process(&mut self, data: &mut ProcessData<'_>) {
        match self.kind {
            ContainerKind::Chain => {
                for c in &mut self.children {
                    c.process(data);
                }
            }
            ContainerKind::Split => self.process_split(data),
            ContainerKind::Multi => {
                let layout = multi_layout(self.children.len(), data.num_channels());
                let offsets: [(usize, usize); MAX_CHANNELS] = {
                    let mut o = [(0, 0); MAX_CHANNELS];
                    for (slot, l) in o.iter_mut().zip(layout) {
                        *slot = l;
                    }
                    o
                };
                for (c, (start, count)) in self.children.iter_mut().zip(offsets) {
                    c.process(&mut data.sub_channels(start, count));
                }
            }
            ContainerKind::Frame(_) => {
                let children = &mut self.children;
                data.for_each_frame(|frame| {
                    for c in children.iter_mut() {
                        c.process_frame(frame);
                    }
                });
            }
            ContainerKind::FixBlock(n) => {
                let total = data.num_samples();
                let mut offset = 0;
                while offset < total {
                    let len = n.min(total - offset);
                    let mut block = data.sub_block(offset, len);
                    for c in &mut self.children {
                        c.process(&mut block);
                    }
                    offset += len;
                }
            }
            ContainerKind::ModChain => {
                if data.num_channels() == 0 {
                    return;
                }
                let n = data.num_samples().min(self.scratch.num_samples());
                let mut mono = self.scratch.process_data(n);
                mono.channel_mut(0).copy_from_slice(&data.channel(0)[..n]);
                for c in &mut self.children {
                    c.process(&mut mono);
                }
            }
            ContainerKind::Oversample(factor) => self.process_oversampled(data, factor),
        }
    }

    fn process_split(&mut self, data: &mut ProcessData<'_>) {
        let n = data.num_samples().min(self.scratch.num_samples());
        let Some((first, rest)) = self.children.split_first_mut() else {
            return;
        };

        let mut original = self.scratch.process_data(n);
        original.copy_from(data);
        first.process(data);

        for c in rest {
            let mut work = self.work.process_data(n);
            work.copy_from(&original);
            c.process(&mut work);
            data.add_from(&work);
        }
    }

    fn process_oversampled(&mut self, data: &mut ProcessData<'_>, factor: usize) {
        let coeffs = if factor == 4 { &COEFFS_4X } else { &COEFFS_2X };
        let n = data.num_samples().min(self.scratch.num_samples() / factor.max(1));
        let channels = data.num_channels().min(self.resamplers.len());

        let mut up = self.scratch.process_data(n * factor);
        for (c, state) in self.resamplers.iter_mut().enumerate().take(channels) {
            let input = data.channel(c);
            let out = up.channel_mut(c);
            for (x, chunk) in input[..n].iter().zip(out.chunks_exact_mut(factor)) {
                state.upsample(*x, chunk);
            }
        }

        for child in &mut self.children {
            child.process(&mut up);
        }

        for (c, state) in self.resamplers.iter_mut().enumerate().take(channels) {
            let oversampled = up.channel(c);
            let out = data.channel_mut(c);
            for (y, chunk) in out[..n].iter_mut().zip(oversampled.chunks_exact(factor)) {
                *y = state.downsample(chunk, coeffs);
            }
        }
    }

    /// Processes one frame through the children.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        match self.kind {
            ContainerKind::Split => {
                let mut original = [0.0f32; MAX_CHANNELS];
                let mut sum = [0.0f32; MAX_CHANNELS];
                let n = frame.len().min(MAX_CHANNELS);
                original[..n].copy_from_slice(&frame[..n]);
                for c in &mut self.children {
                    let mut work = original;
                    c.process_frame(&mut work[..n]);
                    for (s, w) in sum[..n].iter_mut().zip(&work[..n]) {
                        *s += *w;
                    }
                }
                if !self.children.is_empty() {
                    frame[..n].copy_from_slice(&sum[..n]);
                }
            }
            ContainerKind::Multi => {
                let layout: [(usize, usize); MAX_CHANNELS] = {
                    let mut o = [(0, 0); MAX_CHANNELS];
                    for (slot, l) in o.iter_mut().zip(multi_layout(self.children.len(), frame.len())) {
                        *slot = l;
                    }
                    o
                };
                for (c, (start, count)) in self.children.iter_mut().zip(layout) {
                    if let Some(sub) = frame.get_mut(start..start + count) {
                        c.process_frame(sub);
                    }
                }
            }
            ContainerKind::ModChain => {
                let mut mono = [frame.first().copied().unwrap_or(0.0)];
                for c in &mut self.children {
                    c.process_frame(&mut mono);
                }
            }
            ContainerKind::Chain
            | ContainerKind::Frame(_)
            | ContainerKind::FixBlock(_)
            | ContainerKind::Oversample(_) => {
                for c in &mut self.children {
                    c.process_frame(frame);
                }
            }
        }
    }

    /// Clears the state of every child.
    pub fn reset(&mut self) {
        self.resamplers.fill(ResamplerState::default());
        for c in &mut self.children {
            c.reset();
        }
    }

    /// Forwards an event to every child.
    pub fn handle_hise_event(&mut self, event: &mut HiseEvent) {
        for c in &mut self.children {
            c.handle_hise_event(event);
        }
    }
}
