//! Well-known envelope codes used by the IM server.
//!
//! The envelope `code` field says what a frame is about. Unrecognized
//! codes are left to the application; [`MessageCode::from_code`] returns
//! `None` for them.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// MessageCode
// ============================================================================

/// Envelope `code` values understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum MessageCode {
    // Status
    Error = -1,
    Success = 0,

    // Session
    Login = 1,
    Logout = 2,
    LoginExpired = 3,
    RefreshToken = 4,
    ForceLogout = 5,
    TokenError = 6,
    NotLogin = 7,

    // Connection
    Register = 100,
    HeartBeat = 101,
    Connect = 102,
    Disconnect = 103,
    DuplicateLogin = 104,
    PresenceUpdate = 105,
    LastSeenUpdate = 106,
    LoginFailedTooManyTimes = 107,
    RegisterSuccess = 120,
    RegisterFailed = 121,
    HeartBeatSuccess = 130,
    HeartBeatFailed = 131,

    // Calls
    RtcStartAudioCall = 500,
    RtcStartVideoCall = 501,
    RtcAccept = 502,
    RtcReject = 503,
    RtcCancel = 504,
    RtcFailed = 505,
    RtcHandup = 506,
    RtcCandidate = 507,
    RtcOffline = 508,

    // Messages
    SingleMessage = 1000,
    GroupMessage = 1001,
    VideoMessage = 1002,
    SystemMessage = 1003,
    BroadcastMessage = 1004,

    // Account kinds
    User = 2000,
    Robot = 2001,
    PublicAccount = 2002,
    CustomerService = 2003,

    Unknown = 9999,
}

impl MessageCode {
    const ALL: [Self; 40] = [
        Self::Error,
        Self::Success,
        Self::Login,
        Self::Logout,
        Self::LoginExpired,
        Self::RefreshToken,
        Self::ForceLogout,
        Self::TokenError,
        Self::NotLogin,
        Self::Register,
        Self::HeartBeat,
        Self::Connect,
        Self::Disconnect,
        Self::DuplicateLogin,
        Self::PresenceUpdate,
        Self::LastSeenUpdate,
        Self::LoginFailedTooManyTimes,
        Self::RegisterSuccess,
        Self::RegisterFailed,
        Self::HeartBeatSuccess,
        Self::HeartBeatFailed,
        Self::RtcStartAudioCall,
        Self::RtcStartVideoCall,
        Self::RtcAccept,
        Self::RtcReject,
        Self::RtcCancel,
        Self::RtcFailed,
        Self::RtcHandup,
        Self::RtcCandidate,
        Self::RtcOffline,
        Self::SingleMessage,
        Self::GroupMessage,
        Self::VideoMessage,
        Self::SystemMessage,
        Self::BroadcastMessage,
        Self::User,
        Self::Robot,
        Self::PublicAccount,
        Self::CustomerService,
        Self::Unknown,
    ];

    /// Looks up a wire code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|known| known.code() == code)
    }

    /// Returns the wire code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Returns `true` for chat content (single, group, video, system, broadcast).
    #[inline]
    #[must_use]
    pub const fn is_chat_message(self) -> bool {
        matches!(
            self,
            Self::SingleMessage
                | Self::GroupMessage
                | Self::VideoMessage
                | Self::SystemMessage
                | Self::BroadcastMessage
        )
    }

    /// Returns `true` for codes that end the user's session.
    #[inline]
    #[must_use]
    pub const fn ends_session(self) -> bool {
        matches!(
            self,
            Self::ForceLogout | Self::LoginExpired | Self::DuplicateLogin | Self::TokenError
        )
    }

    /// Returns a short English description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Error => "protocol error or malformed packet",
            Self::Success => "success",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::LoginExpired => "login expired",
            Self::RefreshToken => "refresh token",
            Self::ForceLogout => "forced logout",
            Self::TokenError => "token error",
            Self::NotLogin => "not logged in",
            Self::Register => "register",
            Self::HeartBeat => "heartbeat",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::DuplicateLogin => "logged in elsewhere",
            Self::PresenceUpdate => "presence update",
            Self::LastSeenUpdate => "last seen update",
            Self::LoginFailedTooManyTimes => "too many failed logins",
            Self::RegisterSuccess => "register succeeded",
            Self::RegisterFailed => "register failed",
            Self::HeartBeatSuccess => "heartbeat succeeded",
            Self::HeartBeatFailed => "heartbeat failed",
            Self::RtcStartAudioCall => "start audio call",
            Self::RtcStartVideoCall => "start video call",
            Self::RtcAccept => "accept call",
            Self::RtcReject => "reject call",
            Self::RtcCancel => "cancel call",
            Self::RtcFailed => "call failed",
            Self::RtcHandup => "hang up",
            Self::RtcCandidate => "ICE candidate",
            Self::RtcOffline => "peer offline",
            Self::SingleMessage => "private message",
            Self::GroupMessage => "group message",
            Self::VideoMessage => "video message",
            Self::SystemMessage => "system message",
            Self::BroadcastMessage => "broadcast message",
            Self::User => "regular user",
            Self::Robot => "robot",
            Self::PublicAccount => "public account",
            Self::CustomerService => "customer service",
            Self::Unknown => "unknown command",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_known() {
        assert_eq!(MessageCode::from_code(5), Some(MessageCode::ForceLogout));
        assert_eq!(MessageCode::from_code(1001), Some(MessageCode::GroupMessage));
        assert_eq!(MessageCode::from_code(-1), Some(MessageCode::Error));
        assert_eq!(MessageCode::from_code(9999), Some(MessageCode::Unknown));
    }

    #[test]
    fn test_from_code_unknown() {
        assert_eq!(MessageCode::from_code(42), None);
    }

    #[test]
    fn test_every_variant_round_trips() {
        for code in MessageCode::ALL {
            assert_eq!(MessageCode::from_code(code.code()), Some(code));
        }
    }

    #[test]
    fn test_classification() {
        assert!(MessageCode::SingleMessage.is_chat_message());
        assert!(!MessageCode::HeartBeat.is_chat_message());
        assert!(MessageCode::ForceLogout.ends_session());
        assert!(!MessageCode::Success.ends_session());
    }
}
