//! Extension channels declared by `I` records and the primary engine channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width in characters of every extension value read from a position record.
pub const CHANNEL_WIDTH: usize = 3;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Channel {
    /// True airspeed.
    Tas,
    /// Ground speed.
    Gsp,
    /// Engine revolutions.
    Rpm,
    /// Means of propulsion (engine current/noise sensor).
    Mop,
    /// Environmental noise level.
    Enl,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Tas,
        Channel::Gsp,
        Channel::Rpm,
        Channel::Mop,
        Channel::Enl,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "TAS" => Some(Channel::Tas),
            "GSP" => Some(Channel::Gsp),
            "RPM" => Some(Channel::Rpm),
            "MOP" => Some(Channel::Mop),
            "ENL" => Some(Channel::Enl),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Channel::Tas => "TAS",
            Channel::Gsp => "GSP",
            Channel::Rpm => "RPM",
            Channel::Mop => "MOP",
            Channel::Enl => "ENL",
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::Tas => 0,
            Channel::Gsp => 1,
            Channel::Rpm => 2,
            Channel::Mop => 3,
            Channel::Enl => 4,
        }
    }
}

/// Engine sensor used for engine-run detection, highest priority first.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PrimaryChannel {
    Rpm,
    Mop,
    Enl,
    #[default]
    None,
}

impl PrimaryChannel {
    /// Channels eligible as primary, in descending priority.
    const PRIORITY: [(Channel, PrimaryChannel); 3] = [
        (Channel::Rpm, PrimaryChannel::Rpm),
        (Channel::Mop, PrimaryChannel::Mop),
        (Channel::Enl, PrimaryChannel::Enl),
    ];

    pub fn channel(self) -> Option<Channel> {
        match self {
            PrimaryChannel::Rpm => Some(Channel::Rpm),
            PrimaryChannel::Mop => Some(Channel::Mop),
            PrimaryChannel::Enl => Some(Channel::Enl),
            PrimaryChannel::None => None,
        }
    }

    /// `(on_above, off_below)` hysteresis limits for this sensor.
    pub fn limits(self) -> Option<(u32, u32)> {
        match self {
            PrimaryChannel::Rpm => Some((50, 20)),
            PrimaryChannel::Mop => Some((500, 50)),
            PrimaryChannel::Enl => Some((600, 250)),
            PrimaryChannel::None => None,
        }
    }
}

impl fmt::Display for PrimaryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel() {
            Some(channel) => f.write_str(channel.tag()),
            None => f.write_str("NONE"),
        }
    }
}

/// 1-based character offsets of each declared channel's value in position records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensorMap {
    offsets: [Option<usize>; 5],
}

impl SensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a channel declaration. A zero offset leaves the channel undeclared.
    pub fn declare(&mut self, channel: Channel, offset: usize) {
        self.offsets[channel.index()] = if offset > 0 { Some(offset) } else { None };
    }

    pub fn offset(&self, channel: Channel) -> Option<usize> {
        self.offsets[channel.index()]
    }

    pub fn is_declared(&self, channel: Channel) -> bool {
        self.offset(channel).is_some()
    }

    pub fn primary(&self) -> PrimaryChannel {
        PrimaryChannel::PRIORITY
            .iter()
            .find(|(channel, _)| self.is_declared(*channel))
            .map(|(_, primary)| *primary)
            .unwrap_or_default()
    }

    /// Read every declared channel from a raw position line.
    pub fn read_values(&self, line: &str) -> ChannelValues {
        let mut values = ChannelValues::default();
        for channel in Channel::ALL {
            if let Some(offset) = self.offset(channel) {
                values.0[channel.index()] = read_field(line, offset);
            }
        }
        values
    }
}

fn read_field(line: &str, offset: usize) -> Option<u32> {
    let start = offset.checked_sub(1)?;
    line.get(start..start + CHANNEL_WIDTH)?.trim().parse().ok()
}

/// Raw extension values of one position record; `None` when undeclared or unreadable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelValues([Option<u32>; 5]);

impl ChannelValues {
    pub fn get(&self, channel: Channel) -> Option<u32> {
        self.0[channel.index()]
    }

    pub fn with(mut self, channel: Channel, value: u32) -> Self {
        self.0[channel.index()] = Some(value);
        self
    }
}
