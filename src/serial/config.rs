use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Result, SerialError};

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn from_native_code(code: i32) -> Result<Self> {
        match code {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(SerialError::invalid_parameter(format!("data bits {}", other))),
        }
    }

    pub fn native_code(self) -> i32 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<serialport::DataBits> for DataBits {
    fn from(bits: serialport::DataBits) -> Self {
        match bits {
            serialport::DataBits::Five => DataBits::Five,
            serialport::DataBits::Six => DataBits::Six,
            serialport::DataBits::Seven => DataBits::Seven,
            serialport::DataBits::Eight => DataBits::Eight,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    pub fn from_native_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Even),
            2 => Ok(Parity::Odd),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            other => Err(SerialError::invalid_parameter(format!("parity code {}", other))),
        }
    }

    pub fn native_code(self) -> i32 {
        match self {
            Parity::None => 0,
            Parity::Even => 1,
            Parity::Odd => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        }
    }

    fn token(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = SerialError;

    // serialport only drives the three termios/DCB parities it can express portably.
    fn try_from(parity: Parity) -> Result<Self> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Mark | Parity::Space => Err(SerialError::Unsupported(format!("{:?} parity", parity))),
        }
    }
}

impl From<serialport::Parity> for Parity {
    fn from(parity: serialport::Parity) -> Self {
        match parity {
            serialport::Parity::None => Parity::None,
            serialport::Parity::Even => Parity::Even,
            serialport::Parity::Odd => Parity::Odd,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    pub fn from_native_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            3 => Ok(StopBits::OneAndHalf),
            other => Err(SerialError::invalid_parameter(format!("stop bits code {}", other))),
        }
    }

    pub fn native_code(self) -> i32 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
            StopBits::OneAndHalf => 3,
        }
    }

    fn token(self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OneAndHalf => "1.5",
            StopBits::Two => "2",
        }
    }
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = SerialError;

    fn try_from(bits: StopBits) -> Result<Self> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OneAndHalf => Err(SerialError::Unsupported("1.5 stop bits".to_string())),
        }
    }
}

impl From<serialport::StopBits> for StopBits {
    fn from(bits: serialport::StopBits) -> Self {
        match bits {
            serialport::StopBits::One => StopBits::One,
            serialport::StopBits::Two => StopBits::Two,
        }
    }
}

/// Line configuration of an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Config {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Config {
    pub fn new(baud: u32, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        Self { baud, data_bits, parity, stop_bits }
    }

    /// Build a config from the integer codes used across the binding boundary.
    pub fn from_native(baud: i32, data_bits: i32, parity: i32, stop_bits: i32) -> Result<Self> {
        if baud <= 0 {
            return Err(SerialError::invalid_parameter(format!("baud {}", baud)));
        }
        Ok(Self {
            baud: baud as u32,
            data_bits: DataBits::from_native_code(data_bits)?,
            parity: Parity::from_native_code(parity)?,
            stop_bits: StopBits::from_native_code(stop_bits)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud == 0 {
            return Err(SerialError::invalid_parameter("baud must be positive"));
        }
        if self.baud > i32::MAX as u32 {
            return Err(SerialError::invalid_parameter(format!("baud {} out of range", self.baud)));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for Config {
    /// Short form such as `8N1`. The baud rate is reported by `Port`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.data_bits.native_code(), self.parity.token(), self.stop_bits.token())
    }
}

/// Which driver-side buffer a purge discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurgeSelector {
    Input,
    Output,
    Both,
}

impl PurgeSelector {
    pub fn from_native_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(PurgeSelector::Input),
            1 => Ok(PurgeSelector::Output),
            2 => Ok(PurgeSelector::Both),
            other => Err(SerialError::invalid_parameter(format!("purge selector {}", other))),
        }
    }
}

impl From<PurgeSelector> for serialport::ClearBuffer {
    fn from(selector: PurgeSelector) -> Self {
        match selector {
            PurgeSelector::Input => serialport::ClearBuffer::Input,
            PurgeSelector::Output => serialport::ClearBuffer::Output,
            PurgeSelector::Both => serialport::ClearBuffer::All,
        }
    }
}
