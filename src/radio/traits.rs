use crate::region::{Bandwidth, Modulation};

/// Radio modulation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModulationParams {
    /// Modulation family
    pub modulation: Modulation,
    /// Spreading factor (SF5-SF12)
    pub spreading_factor: u8,
    /// Bandwidth
    pub bandwidth: Bandwidth,
    /// Coding rate denominator (4/5 .. 4/8)
    pub coding_rate: u8,
    /// Low datarate optimization
    pub low_datarate_optimize: bool,
}

impl ModulationParams {
    /// LoRa parameters with coding rate 4/5; low datarate optimization is
    /// enabled when the symbol time reaches 16 ms.
    pub fn lora(spreading_factor: u8, bandwidth: Bandwidth) -> Self {
        let symbol_us = (1u32 << spreading_factor) * 1_000_000 / bandwidth.hz();
        Self {
            modulation: Modulation::Lora,
            spreading_factor,
            bandwidth,
            coding_rate: 5,
            low_datarate_optimize: symbol_us >= 16_000,
        }
    }
}

/// Radio packet parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketParams {
    /// Preamble length in symbols
    pub preamble_len: u16,
    /// Implicit (fixed length) header
    pub implicit_header: bool,
    /// Payload length, maximum length for reception
    pub payload_len: u8,
    /// Payload CRC enabled
    pub crc_on: bool,
    /// IQ inversion
    pub invert_iq: bool,
}

/// Completion reported by the radio after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// Transmission finished
    TxDone,
    /// Packet received, payload ready to read
    RxDone,
    /// Reception window closed without a packet
    RxTimeout,
    /// Packet received with a CRC error
    RxCrcError,
}

/// Status of the last received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketStatus {
    /// RSSI in dBm
    pub rssi: i16,
    /// SNR in dB
    pub snr: i8,
}

/// Receive statistics accumulated by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStats {
    /// Packets received
    pub received: u16,
    /// Packets received with a CRC error
    pub crc_errors: u16,
    /// Packets received with a header error
    pub header_errors: u16,
}

/// Radio driver consumed by the engine
///
/// Register programming lives in the driver; the engine only sequences these
/// calls for the operation that currently owns the radio.
pub trait Radio {
    /// Error type for radio operations
    type Error;

    /// Set the radio frequency
    fn set_frequency(&mut self, freq: u32) -> Result<(), Self::Error>;

    /// Set the radio's transmission power
    fn set_tx_power(&mut self, power: i8) -> Result<(), Self::Error>;

    /// Configure modulation parameters
    fn configure_modulation(&mut self, params: ModulationParams) -> Result<(), Self::Error>;

    /// Configure packet format
    fn configure_packet(&mut self, params: PacketParams) -> Result<(), Self::Error>;

    /// Start transmitting `buffer`
    fn transmit(&mut self, buffer: &[u8]) -> Result<(), Self::Error>;

    /// Start a reception window
    fn receive(&mut self, timeout_ms: u32) -> Result<(), Self::Error>;

    /// Completion of the running operation, `WouldBlock` while it is running
    fn poll_event(&mut self) -> nb::Result<RadioEvent, Self::Error>;

    /// Copy the received payload into `buffer`, returns its length
    fn read_payload(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Status of the last received packet
    fn packet_status(&mut self) -> Result<PacketStatus, Self::Error>;

    /// Receive statistics
    fn rx_stats(&mut self) -> Result<RxStats, Self::Error>;

    /// Put the radio into sleep mode
    fn sleep(&mut self) -> Result<(), Self::Error>;
}
