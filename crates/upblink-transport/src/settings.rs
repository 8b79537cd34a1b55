use std::time::Duration;

/// Parity setting for the serial line behind the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Stop-bit setting for the serial line behind the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Serial port parameters supplied at session construction.
///
/// The line parameters (baud, parity, stop bits) describe the physical side
/// of the bridge and are applied by whichever daemon owns the actual device;
/// the engine itself only consumes `receive_timeout`, which bounds each
/// blocking read so the reader loop can observe shutdown periodically.
#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Line speed. UPB PIMs are fixed at 4800.
    pub baud: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Upper bound for a single blocking read on the link.
    pub receive_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: 4800,
            parity: Parity::None,
            stop_bits: StopBits::One,
            receive_timeout: Duration::from_millis(100),
        }
    }
}

impl PortSettings {
    /// Short form used in connect logs, e.g. `4800-8N1`.
    pub fn describe(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let stop = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        format!("{}-8{}{}", self.baud, parity, stop)
    }
}
