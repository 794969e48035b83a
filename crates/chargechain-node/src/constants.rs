pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const DEFAULT_MINE_TIMEOUT_SECS: u64 = 60;
pub(crate) const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";
pub(crate) const SMS_TIMEOUT_SECS: u64 = 10;

pub(crate) const MSG_MINED_AND_SENT: &str = "Block mined and SMS sent";
pub(crate) const MSG_MINED: &str = "Block mined";
