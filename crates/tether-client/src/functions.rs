//! Typed functions
//!
//! A [`RemoteFunction`] is a serializable request struct whose fields are
//! the wire fields of `TAG`. [`Client::send`](crate::Client::send) encodes
//! it, routes it like any other call, and decodes the result into `Output`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tether_core::AuthorizationState;

/// A request with a statically known tag and result type
pub trait RemoteFunction: Serialize {
    /// Wire tag of the request
    const TAG: &'static str;

    /// Decoded result
    type Output: DeserializeOwned;
}

macro_rules! remote_function {
    ($ty:ty => $tag:literal, $output:ty) => {
        impl RemoteFunction for $ty {
            const TAG: &'static str = $tag;
            type Output = $output;
        }
    };
}

/// Result of functions that only acknowledge (`ok`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Acknowledged {}

/// A user account
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    /// User identifier
    pub id: i64,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: String,
    /// Phone number, without the leading `+`
    #[serde(default)]
    pub phone_number: String,
}

/// A chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Chat {
    /// Chat identifier
    pub id: i64,
    /// Chat title
    #[serde(default)]
    pub title: String,
    /// Number of unread messages
    #[serde(default)]
    pub unread_count: i32,
}

/// Value of an engine option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum OptionValue {
    /// Boolean option
    #[serde(rename = "optionValueBoolean")]
    Boolean {
        /// Value
        value: bool,
    },
    /// Unset option
    #[serde(rename = "optionValueEmpty")]
    Empty,
    /// 64-bit integer option, carried as a decimal string on the wire
    #[serde(rename = "optionValueInteger")]
    Integer {
        /// Value
        #[serde(with = "int64")]
        value: i64,
    },
    /// String option
    #[serde(rename = "optionValueString")]
    String {
        /// Value
        value: String,
    },
}

/// Result of `testCallString`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestString {
    /// Echoed value
    pub value: String,
}

/// Result of `testSquareInt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TestInt {
    /// Computed value
    pub value: i32,
}

/// Result of `getFileMimeType` and similar string-returning functions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Text {
    /// The text
    pub text: String,
}

mod int64 {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Current authorization state
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetAuthorizationState {}
remote_function!(GetAuthorizationState => "getAuthorizationState", AuthorizationState);

/// Initialization parameters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetTdlibParameters {
    /// Use the test environment
    pub use_test_dc: bool,
    /// Persistent data directory
    pub database_directory: String,
    /// Application identifier
    pub api_id: i32,
    /// Application hash
    pub api_hash: String,
    /// IETF language tag of the user's OS
    pub system_language_code: String,
    /// Device model
    pub device_model: String,
    /// Application version
    pub application_version: String,
}
remote_function!(SetTdlibParameters => "setTdlibParameters", Acknowledged);

/// Start login with a phone number
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetAuthenticationPhoneNumber {
    /// Phone number in international format
    pub phone_number: String,
}
remote_function!(SetAuthenticationPhoneNumber => "setAuthenticationPhoneNumber", Acknowledged);

/// Submit the login code
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckAuthenticationCode {
    /// Received code
    pub code: String,
}
remote_function!(CheckAuthenticationCode => "checkAuthenticationCode", Acknowledged);

/// Submit the two-step verification password
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckAuthenticationPassword {
    /// Password
    pub password: String,
}
remote_function!(CheckAuthenticationPassword => "checkAuthenticationPassword", Acknowledged);

/// Complete registration of a new account
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterUser {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
}
remote_function!(RegisterUser => "registerUser", Acknowledged);

/// Log out of the current session
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogOut {}
remote_function!(LogOut => "logOut", Acknowledged);

/// Close the engine instance
#[derive(Debug, Clone, Default, Serialize)]
pub struct Close {}
remote_function!(Close => "close", Acknowledged);

/// The current user
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetMe {}
remote_function!(GetMe => "getMe", User);

/// A user by id
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetUser {
    /// User identifier
    pub user_id: i64,
}
remote_function!(GetUser => "getUser", User);

/// A chat by id
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetChat {
    /// Chat identifier
    pub chat_id: i64,
}
remote_function!(GetChat => "getChat", Chat);

/// Read an option
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetOption {
    /// Option name
    pub name: String,
}
remote_function!(GetOption => "getOption", OptionValue);

/// Write an option; `None` resets it
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetOption {
    /// Option name
    pub name: String,
    /// New value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<OptionValue>,
}
remote_function!(SetOption => "setOption", Acknowledged);

/// MIME type of a file name (local)
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetFileMimeType {
    /// File name or path
    pub file_name: String,
}
remote_function!(GetFileMimeType => "getFileMimeType", Text);

/// Echo a string through the engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestCallString {
    /// Value to echo
    pub x: String,
}
remote_function!(TestCallString => "testCallString", TestString);

/// Square an integer in the engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestSquareInt {
    /// Value to square
    pub x: i32,
}
remote_function!(TestSquareInt => "testSquareInt", TestInt);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_value_wire_shape() {
        let value = OptionValue::Integer { value: 1 << 60 };
        let encoded = serde_json::to_value(&value).unwrap();
        assert_eq!(
            encoded,
            json!({"@type": "optionValueInteger", "value": "1152921504606846976"})
        );

        let from_number: OptionValue =
            serde_json::from_value(json!({"@type": "optionValueInteger", "value": 5})).unwrap();
        assert_eq!(from_number, OptionValue::Integer { value: 5 });

        let empty: OptionValue =
            serde_json::from_value(json!({"@type": "optionValueEmpty"})).unwrap();
        assert_eq!(empty, OptionValue::Empty);
    }

    #[test]
    fn test_outputs_ignore_type_key() {
        let user: User = serde_json::from_value(json!({
            "@type": "user",
            "id": 7,
            "first_name": "Ada",
            "usernames": null
        }))
        .unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.last_name, "");

        let _: Acknowledged = serde_json::from_value(json!({"@type": "ok"})).unwrap();
    }

    #[test]
    fn test_request_fields() {
        assert_eq!(serde_json::to_value(GetMe {}).unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(SetOption {
                name: "x".into(),
                value: None
            })
            .unwrap(),
            json!({"name": "x"})
        );
        assert_eq!(<GetChat as RemoteFunction>::TAG, "getChat");
    }
}
