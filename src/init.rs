//! ## Initialization
//!
//! Configuration of the device side: what the interface advertises to the
//! host and how the bridge behaves.
//!

use crate::constants::usb::{USB488_VERSION, USBTMC_VERSION};

/// ### Capabilities
///
/// The capabilities advertised in the GET_CAPABILITIES response.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// USBTMC release (BCD)
    pub bcd_usbtmc: u16,
    /// Can accept a control command for pulse
    pub accepts_indicator_pulse_request: bool,
    /// Only sends data to the controller
    pub is_talk_only: bool,
    /// Only accepts data from the controller
    pub is_listen_only: bool,
    /// Can end a bulk-IN transfer on the term char requested by the host
    pub supports_bulk_in_term_char: bool,
    /// USB488 release (BCD)
    pub bcd_usb488: u16,
    /// Accepts the USB488 TRIGGER message
    pub supports_trigger: bool,
    /// Accepts REN_CONTROL, GO_TO_LOCAL and LOCAL_LOCKOUT
    pub supports_ren_gtl_llo: bool,
    /// Is a 488.2 interface
    pub is_488_2: bool,
    /// Understands SCPI
    pub scpi: bool,
    /// Service request capability SR1
    pub sr1: bool,
    /// Remote/local capability RL1
    pub rl1: bool,
    /// Device trigger capability DT1
    pub dt1: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            bcd_usbtmc: USBTMC_VERSION,
            accepts_indicator_pulse_request: true,
            is_talk_only: false,
            is_listen_only: false,
            supports_bulk_in_term_char: false,
            bcd_usb488: USB488_VERSION,
            supports_trigger: true,
            supports_ren_gtl_llo: false,
            is_488_2: true,
            scpi: true,
            sr1: false,
            rl1: false,
            dt1: false,
        }
    }
}

/// ### Config
///
/// Settings of a [`UsbtmcDevice`](crate::UsbtmcDevice).
///
#[derive(Clone, Debug)]
pub struct Config {
    pub capabilities: Capabilities,
    /// When a bulk-IN request is waiting and the command produced no reply,
    /// send the received command back instead of nothing.
    pub echo_unanswered_commands: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capabilities: Capabilities::default(),
            echo_unanswered_commands: true,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// ### Capabilities
    ///
    /// Replace the advertised capabilities.
    ///
    pub fn capabilities(mut self, capabilities: Capabilities) -> Config {
        self.capabilities = capabilities;
        self
    }

    /// ### Echo Unanswered Commands
    ///
    /// Enable or disable echoing the received command when it produced no reply.
    ///
    pub fn echo_unanswered_commands(mut self, enabled: bool) -> Config {
        self.echo_unanswered_commands = enabled;
        self
    }
}
