//! MQ arithmetic coder used by JBIG2 generic regions.
//!
//! The decoder follows the INITDEC/DECODE/RENORMD/BYTEIN procedures of
//! ITU-T T.88 Annex E; the encoder follows INITENC/ENCODE/RENORME/BYTEOUT/FLUSH
//! from the same annex, so anything it writes reads back bit-for-bit.
//!
//! Probability state lives in [`ContextStats`], which is kept apart from the
//! coder so a region can reuse or reset statistics independently of the data.

/// One row of the probability estimation table (Table E.1).
#[derive(Debug, Clone, Copy)]
struct QeEntry {
    qe: u32,
    nmps: u8,
    nlps: u8,
    switch: bool,
}

const fn qe(qe: u32, nmps: u8, nlps: u8, switch: bool) -> QeEntry {
    QeEntry {
        qe,
        nmps,
        nlps,
        switch,
    }
}

#[rustfmt::skip]
const QE_TABLE: [QeEntry; 47] = [
    qe(0x5601, 1, 1, true),
    qe(0x3401, 2, 6, false),
    qe(0x1801, 3, 9, false),
    qe(0x0AC1, 4, 12, false),
    qe(0x0521, 5, 29, false),
    qe(0x0221, 38, 33, false),
    qe(0x5601, 7, 6, true),
    qe(0x5401, 8, 14, false),
    qe(0x4801, 9, 14, false),
    qe(0x3801, 10, 14, false),
    qe(0x3001, 11, 17, false),
    qe(0x2401, 12, 18, false),
    qe(0x1C01, 13, 20, false),
    qe(0x1601, 29, 21, false),
    qe(0x5601, 15, 14, true),
    qe(0x5401, 16, 14, false),
    qe(0x5101, 17, 15, false),
    qe(0x4801, 18, 16, false),
    qe(0x3801, 19, 17, false),
    qe(0x3401, 20, 18, false),
    qe(0x3001, 21, 19, false),
    qe(0x2801, 22, 19, false),
    qe(0x2401, 23, 20, false),
    qe(0x2201, 24, 21, false),
    qe(0x1C01, 25, 22, false),
    qe(0x1801, 26, 23, false),
    qe(0x1601, 27, 24, false),
    qe(0x1401, 28, 25, false),
    qe(0x1201, 29, 26, false),
    qe(0x1101, 30, 27, false),
    qe(0x0AC1, 31, 28, false),
    qe(0x09C1, 32, 29, false),
    qe(0x08A1, 33, 30, false),
    qe(0x0521, 34, 31, false),
    qe(0x0441, 35, 32, false),
    qe(0x02A1, 36, 33, false),
    qe(0x0221, 37, 34, false),
    qe(0x0141, 38, 35, false),
    qe(0x0111, 39, 36, false),
    qe(0x0085, 40, 37, false),
    qe(0x0049, 41, 38, false),
    qe(0x0025, 42, 39, false),
    qe(0x0015, 43, 40, false),
    qe(0x0009, 44, 41, false),
    qe(0x0005, 45, 42, false),
    qe(0x0001, 45, 43, false),
    qe(0x5601, 46, 46, false),
];

/// Probability state for one context: an index into the Qe table and the
/// current more-probable symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Context {
    index: u8,
    mps: u8,
}

/// Adaptive statistics for a family of contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStats {
    contexts: Vec<Context>,
}

impl ContextStats {
    /// Statistics for `1 << bits` contexts, all in the initial state.
    pub fn new(bits: u32) -> Self {
        Self {
            contexts: vec![Context::default(); 1 << bits],
        }
    }

    /// Return every context to index 0 with MPS 0.
    pub fn reset(&mut self) {
        self.contexts.fill(Context::default());
    }

    /// Number of contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether there are no contexts.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    fn get_mut(&mut self, cx: usize) -> &mut Context {
        let len = self.contexts.len();
        &mut self.contexts[cx % len]
    }
}

/// MQ decoder over a byte slice. Reading past the end behaves as if the data
/// were followed by 0xFF bytes, which the decoder treats as a marker.
pub struct MqDecoder<'a> {
    data: &'a [u8],
    c: u32,
    a: u32,
    bp: usize,
    ct: u32,
}

impl<'a> MqDecoder<'a> {
    /// INITDEC.
    pub fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            c: 0,
            a: 0,
            bp: 0,
            ct: 0,
        };
        decoder.c = ((decoder.current() as u32) ^ 0xFF) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct = decoder.ct.saturating_sub(7);
        decoder.a = 0x8000;
        decoder
    }

    /// Decode one bit in context `cx`.
    pub fn decode(&mut self, stats: &mut ContextStats, cx: usize) -> u8 {
        let context = stats.get_mut(cx);
        let entry = QE_TABLE[context.index as usize];

        self.a -= entry.qe;
        if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return context.mps;
            }
            // MPS_EXCHANGE
            let bit = if self.a < entry.qe {
                let lps = 1 - context.mps;
                if entry.switch {
                    context.mps = 1 - context.mps;
                }
                context.index = entry.nlps;
                lps
            } else {
                context.index = entry.nmps;
                context.mps
            };
            self.renormalize();
            bit
        } else {
            self.c -= self.a << 16;
            // LPS_EXCHANGE
            let bit = if self.a < entry.qe {
                context.index = entry.nmps;
                context.mps
            } else {
                let lps = 1 - context.mps;
                if entry.switch {
                    context.mps = 1 - context.mps;
                }
                context.index = entry.nlps;
                lps
            };
            self.a = entry.qe;
            self.renormalize();
            bit
        }
    }

    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn byte_in(&mut self) {
        if self.current() == 0xFF {
            if self.next() > 0x8F {
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c = self
                    .c
                    .wrapping_add(0xFE00)
                    .wrapping_sub((self.current() as u32) << 9);
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c = self
                .c
                .wrapping_add(0xFF00)
                .wrapping_sub((self.current() as u32) << 8);
            self.ct = 8;
        }
    }

    fn current(&self) -> u8 {
        self.data.get(self.bp).copied().unwrap_or(0xFF)
    }

    fn next(&self) -> u8 {
        self.data.get(self.bp + 1).copied().unwrap_or(0xFF)
    }
}

/// MQ encoder producing a byte stream terminated by the 0xFFAC marker.
pub struct MqEncoder {
    out: Vec<u8>,
    c: u32,
    a: u32,
    ct: u32,
    /// Byte at BP, still open to a carry.
    b: u8,
    /// False while BP points before the start of the buffer.
    started: bool,
}

impl Default for MqEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MqEncoder {
    /// INITENC.
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            c: 0,
            a: 0x8000,
            ct: 12,
            b: 0,
            started: false,
        }
    }

    /// Encode one bit in context `cx`.
    pub fn encode(&mut self, stats: &mut ContextStats, cx: usize, bit: u8) {
        let context = stats.get_mut(cx);
        let entry = QE_TABLE[context.index as usize];

        if bit & 1 == context.mps {
            // CODEMPS
            self.a -= entry.qe;
            if self.a & 0x8000 == 0 {
                if self.a < entry.qe {
                    self.a = entry.qe;
                } else {
                    self.c += entry.qe;
                }
                context.index = entry.nmps;
                self.renormalize();
            } else {
                self.c += entry.qe;
            }
        } else {
            // CODELPS
            self.a -= entry.qe;
            if self.a < entry.qe {
                self.c += entry.qe;
            } else {
                self.a = entry.qe;
            }
            if entry.switch {
                context.mps = 1 - context.mps;
            }
            context.index = entry.nlps;
            self.renormalize();
        }
    }

    /// FLUSH and append the terminating marker.
    pub fn finish(mut self) -> Vec<u8> {
        // SETBITS
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        self.emit_pending();
        if self.b != 0xFF {
            self.out.push(0xFF);
        }
        self.out.push(0xAC);
        self.out
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn byte_out(&mut self) {
        if self.b == 0xFF {
            self.stuffed_byte();
        } else if self.c < 0x800_0000 {
            self.normal_byte();
        } else {
            self.b = self.b.wrapping_add(1);
            if self.b == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.stuffed_byte();
            } else {
                self.normal_byte();
            }
        }
    }

    fn stuffed_byte(&mut self) {
        self.emit_pending();
        self.b = (self.c >> 20) as u8;
        self.c &= 0xF_FFFF;
        self.ct = 7;
    }

    fn normal_byte(&mut self) {
        self.emit_pending();
        self.b = (self.c >> 19) as u8;
        self.c &= 0x7_FFFF;
        self.ct = 8;
    }

    fn emit_pending(&mut self) {
        if self.started {
            self.out.push(self.b);
        }
        self.started = true;
    }
}
