//! Linear-interpolation upsampler
//!
//! Takes magnitude samples from the input rate to the working rate with a
//! fixed rational ratio Q:P. Each block of P input samples yields Q output
//! samples; output phase j interpolates between `in[k]` and `in[k+1]` with
//! weights fixed by the phase alone, so everything is precomputed at
//! construction. The caller keeps one input sample of overlap between
//! chunks to satisfy the `in[k+1]` read at the block boundary.

#[derive(Debug, Clone, Copy)]
struct PhaseConst {
    k: usize,
    c1: f32,
    c2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    /// P == Q: the input already runs at the working rate.
    Passthrough,
    /// Q == 2P: every input sample plus its midpoint.
    Doubling,
    Generic,
}

pub struct Resampler {
    p: usize,
    q: usize,
    kernel: Kernel,
    phases: Vec<PhaseConst>,
}

impl Resampler {
    pub fn new(p: usize, q: usize) -> Self {
        debug_assert!(p >= 1 && q >= p);
        let kernel = if p == q {
            Kernel::Passthrough
        } else if q == 2 * p {
            Kernel::Doubling
        } else {
            Kernel::Generic
        };
        Self {
            p,
            q,
            kernel,
            phases: Self::phase_constants(p, q),
        }
    }

    /// For phase j: `k = floor(j*P/Q)`, `c2 = j*P mod Q`, `c1 = Q - c2`,
    /// weights stored pre-divided by Q.
    fn phase_constants(p: usize, q: usize) -> Vec<PhaseConst> {
        let scale = 1.0 / q as f32;
        (0..q)
            .map(|j| {
                let jp = j * p;
                let c2 = (jp % q) as f32;
                PhaseConst {
                    k: jp / q,
                    c1: (q as f32 - c2) * scale,
                    c2: c2 * scale,
                }
            })
            .collect()
    }

    /// Resample `num_blocks` blocks. `input` must hold at least
    /// `num_blocks * P + 1` samples (the final one is the lookahead),
    /// `output` exactly `num_blocks * Q`.
    pub fn resample(&self, input: &[f32], output: &mut [f32], num_blocks: usize) {
        debug_assert!(input.len() > num_blocks * self.p);
        debug_assert!(output.len() >= num_blocks * self.q);

        match self.kernel {
            Kernel::Passthrough => {
                output[..num_blocks * self.q].copy_from_slice(&input[..num_blocks * self.q]);
            }
            Kernel::Doubling => {
                for b in 0..num_blocks * self.p {
                    output[2 * b] = input[b];
                    output[2 * b + 1] = 0.5 * (input[b] + input[b + 1]);
                }
            }
            Kernel::Generic => {
                for b in 0..num_blocks {
                    let inb = &input[b * self.p..];
                    let outb = &mut output[b * self.q..b * self.q + self.q];
                    for (j, ph) in self.phases.iter().enumerate() {
                        outb[j] = ph.c1 * inb[ph.k] + ph.c2 * inb[ph.k + 1];
                    }
                }
            }
        }
    }
}
