//! Built-in protocol surface
//!
//! [`DECLARED_TAGS`] is the declaration surface: every tag the runtime
//! knows how to speak. [`schemas`] gives each one its shape. The two are
//! kept apart on purpose so that [`TypeRegistry::builtin`] can cross-check
//! them at startup.
//!
//! [`TypeRegistry::builtin`]: crate::TypeRegistry::builtin

use crate::admission::Admission;
use crate::auth::AuthorizationState::{self, *};
use crate::schema::{FieldType, Schema};
use FieldType::{Bool, Bytes, Double, Int32, Int53, Int64};

/// Every tag of the built-in surface
pub const DECLARED_TAGS: &[&str] = &[
    // generic results
    "ok",
    "error",
    "text",
    "count",
    "seconds",
    // authorization
    "authorizationStateWaitTdlibParameters",
    "authorizationStateWaitPhoneNumber",
    "authorizationStateWaitPremiumPurchase",
    "authorizationStateWaitEmailAddress",
    "authorizationStateWaitEmailCode",
    "authorizationStateWaitCode",
    "authorizationStateWaitRegistration",
    "authorizationStateWaitPassword",
    "authorizationStateWaitOtherDeviceConfirmation",
    "authorizationStateReady",
    "authorizationStateLoggingOut",
    "authorizationStateClosing",
    "authorizationStateClosed",
    "authenticationCodeInfo",
    "authenticationCodeTypeSms",
    "authenticationCodeTypeTelegramMessage",
    "authenticationCodeTypeCall",
    "phoneNumberAuthenticationSettings",
    "emailAddressAuthenticationCode",
    "emailAddressAuthenticationGoogleId",
    "passwordRecoveryInfo",
    // users and chats
    "user",
    "usernames",
    "chat",
    "chats",
    "chatListMain",
    "chatListArchive",
    "chatListFolder",
    // messages
    "message",
    "messages",
    "messageText",
    "messageUnsupported",
    "formattedText",
    "textEntity",
    "textEntities",
    "textEntityTypeBold",
    "textEntityTypeItalic",
    "textEntityTypeUrl",
    "textEntityTypeMention",
    "textParseModeMarkdown",
    "textParseModeHTML",
    "inputMessageText",
    "linkPreviewOptions",
    // options and logging
    "optionValueBoolean",
    "optionValueEmpty",
    "optionValueInteger",
    "optionValueString",
    "logVerbosityLevel",
    // connection
    "connectionStateWaitingForNetwork",
    "connectionStateConnectingToProxy",
    "connectionStateConnecting",
    "connectionStateUpdating",
    "connectionStateReady",
    // testing
    "testString",
    "testInt",
    "testBytes",
    "testVectorInt",
    // updates
    "updateAuthorizationState",
    "updateNewMessage",
    "updateMessageSendSucceeded",
    "updateDeleteMessages",
    "updateChatTitle",
    "updateChatReadInbox",
    "updateUser",
    "updateOption",
    "updateConnectionState",
    // functions: lifecycle
    "getAuthorizationState",
    "setTdlibParameters",
    "setAuthenticationPhoneNumber",
    "setAuthenticationEmailAddress",
    "checkAuthenticationEmailCode",
    "resendAuthenticationCode",
    "checkAuthenticationCode",
    "requestQrCodeAuthentication",
    "registerUser",
    "checkAuthenticationPassword",
    "requestAuthenticationPasswordRecovery",
    "checkAuthenticationPasswordRecoveryCode",
    "recoverAuthenticationPassword",
    "checkAuthenticationBotToken",
    "checkAuthenticationPremiumPurchase",
    "logOut",
    "close",
    "destroy",
    // functions: options
    "getOption",
    "setOption",
    // functions: users, chats, messages
    "getMe",
    "getUser",
    "getChat",
    "getChats",
    "loadChats",
    "setChatTitle",
    "getChatHistory",
    "sendMessage",
    "deleteMessages",
    "viewMessages",
    "getPasswordRecoveryInfo",
    // functions: local computation
    "getTextEntities",
    "parseTextEntities",
    "parseMarkdown",
    "getMarkdownText",
    "cleanFileName",
    "getFileMimeType",
    "getFileExtension",
    "setLogVerbosityLevel",
    "getLogVerbosityLevel",
    "addLogMessage",
    // functions: testing
    "testCallEmpty",
    "testCallString",
    "testCallBytes",
    "testCallVectorInt",
    "testSquareInt",
    "testNetwork",
    "testUseUpdate",
];

fn string() -> FieldType {
    FieldType::String
}

fn object(name: &str) -> FieldType {
    FieldType::object(name)
}

fn vector(element: FieldType) -> FieldType {
    FieldType::vector(element)
}

fn only(states: &[AuthorizationState]) -> Admission {
    Admission::in_states(states.iter().copied())
}

/// Schemas of the built-in surface
pub fn schemas() -> Vec<Schema> {
    let mut all = Vec::with_capacity(DECLARED_TAGS.len());
    all.extend(result_objects());
    all.extend(authorization_objects());
    all.extend(chat_objects());
    all.extend(message_objects());
    all.extend(option_objects());
    all.extend(update_objects());
    all.extend(lifecycle_functions());
    all.extend(query_functions());
    all.extend(local_functions());
    all.extend(test_functions());
    all
}

fn result_objects() -> Vec<Schema> {
    vec![
        Schema::object("ok"),
        Schema::object("error")
            .field("code", Int32)
            .field("message", string()),
        Schema::object("text").field("text", string()),
        Schema::object("count").field("count", Int32),
        Schema::object("seconds").field("seconds", Double),
        Schema::object("testString").field("value", string()),
        Schema::object("testInt").field("value", Int32),
        Schema::object("testBytes").field("value", Bytes),
        Schema::object("testVectorInt").field("value", vector(Int32)),
        Schema::object("logVerbosityLevel").field("verbosity_level", Int32),
    ]
}

fn authorization_objects() -> Vec<Schema> {
    let mut objects: Vec<Schema> = AuthorizationState::ALL
        .into_iter()
        .map(|state| {
            let schema = Schema::object(state.tag()).of("AuthorizationState");
            match state {
                WaitCode => schema.optional("code_info", object("authenticationCodeInfo")),
                WaitEmailAddress => schema
                    .optional("allow_apple_id", Bool)
                    .optional("allow_google_id", Bool),
                WaitEmailCode => schema
                    .optional("allow_apple_id", Bool)
                    .optional("allow_google_id", Bool)
                    .optional("code_info", object("authenticationCodeInfo")),
                WaitOtherDeviceConfirmation => schema.field("link", string()),
                WaitPassword => schema
                    .optional("password_hint", string())
                    .optional("has_recovery_email_address", Bool)
                    .optional("recovery_email_address_pattern", string()),
                WaitPremiumPurchase => schema
                    .optional("store_product_id", string())
                    .optional("support_email_address", string()),
                _ => schema,
            }
        })
        .collect();

    objects.extend([
        Schema::object("authenticationCodeInfo")
            .field("phone_number", string())
            .field("type", object("AuthenticationCodeType"))
            .optional("next_type", object("AuthenticationCodeType"))
            .optional("timeout", Int32),
        Schema::object("authenticationCodeTypeSms")
            .of("AuthenticationCodeType")
            .field("length", Int32),
        Schema::object("authenticationCodeTypeTelegramMessage")
            .of("AuthenticationCodeType")
            .field("length", Int32),
        Schema::object("authenticationCodeTypeCall")
            .of("AuthenticationCodeType")
            .field("length", Int32),
        Schema::object("phoneNumberAuthenticationSettings")
            .optional("allow_flash_call", Bool)
            .optional("allow_missed_call", Bool)
            .optional("is_current_phone_number", Bool)
            .optional("allow_sms_retriever_api", Bool),
        Schema::object("emailAddressAuthenticationCode")
            .of("EmailAddressAuthentication")
            .field("code", string()),
        Schema::object("emailAddressAuthenticationGoogleId")
            .of("EmailAddressAuthentication")
            .field("token", string()),
        Schema::object("passwordRecoveryInfo")
            .optional("recovery_email_address_pattern", string()),
    ]);
    objects
}

fn chat_objects() -> Vec<Schema> {
    vec![
        Schema::object("user")
            .field("id", Int53)
            .optional("first_name", string())
            .optional("last_name", string())
            .optional("usernames", object("usernames"))
            .optional("phone_number", string())
            .optional("is_contact", Bool),
        Schema::object("usernames")
            .optional("active_usernames", vector(string()))
            .optional("disabled_usernames", vector(string()))
            .optional("editable_username", string()),
        Schema::object("chat")
            .field("id", Int53)
            .optional("title", string())
            .optional("unread_count", Int32)
            .optional("last_message", object("message")),
        Schema::object("chats")
            .field("total_count", Int32)
            .field("chat_ids", vector(Int53)),
        Schema::object("chatListMain").of("ChatList"),
        Schema::object("chatListArchive").of("ChatList"),
        Schema::object("chatListFolder")
            .of("ChatList")
            .field("chat_folder_id", Int32),
    ]
}

fn message_objects() -> Vec<Schema> {
    vec![
        Schema::object("message")
            .field("id", Int53)
            .field("chat_id", Int53)
            .optional("date", Int32)
            .optional("is_outgoing", Bool)
            .optional("content", object("MessageContent")),
        Schema::object("messages")
            .field("total_count", Int32)
            .field("messages", vector(object("message"))),
        Schema::object("messageText")
            .of("MessageContent")
            .field("text", object("formattedText")),
        Schema::object("messageUnsupported").of("MessageContent"),
        Schema::object("formattedText")
            .field("text", string())
            .optional("entities", vector(object("textEntity"))),
        Schema::object("textEntity")
            .field("offset", Int32)
            .field("length", Int32)
            .field("type", object("TextEntityType")),
        Schema::object("textEntities").field("entities", vector(object("textEntity"))),
        Schema::object("textEntityTypeBold").of("TextEntityType"),
        Schema::object("textEntityTypeItalic").of("TextEntityType"),
        Schema::object("textEntityTypeUrl").of("TextEntityType"),
        Schema::object("textEntityTypeMention").of("TextEntityType"),
        Schema::object("textParseModeMarkdown")
            .of("TextParseMode")
            .field("version", Int32),
        Schema::object("textParseModeHTML").of("TextParseMode"),
        Schema::object("inputMessageText")
            .of("InputMessageContent")
            .field("text", object("formattedText"))
            .optional("link_preview_options", object("linkPreviewOptions"))
            .optional("clear_draft", Bool),
        Schema::object("linkPreviewOptions")
            .optional("is_disabled", Bool)
            .optional("url", string()),
    ]
}

fn option_objects() -> Vec<Schema> {
    vec![
        Schema::object("optionValueBoolean")
            .of("OptionValue")
            .field("value", Bool),
        Schema::object("optionValueEmpty").of("OptionValue"),
        Schema::object("optionValueInteger")
            .of("OptionValue")
            .field("value", Int64),
        Schema::object("optionValueString")
            .of("OptionValue")
            .field("value", string()),
        Schema::object("connectionStateWaitingForNetwork").of("ConnectionState"),
        Schema::object("connectionStateConnectingToProxy").of("ConnectionState"),
        Schema::object("connectionStateConnecting").of("ConnectionState"),
        Schema::object("connectionStateUpdating").of("ConnectionState"),
        Schema::object("connectionStateReady").of("ConnectionState"),
    ]
}

fn update_objects() -> Vec<Schema> {
    vec![
        Schema::object("updateAuthorizationState")
            .of("Update")
            .field("authorization_state", object("AuthorizationState")),
        Schema::object("updateNewMessage")
            .of("Update")
            .field("message", object("message")),
        Schema::object("updateMessageSendSucceeded")
            .of("Update")
            .field("message", object("message"))
            .field("old_message_id", Int53),
        Schema::object("updateDeleteMessages")
            .of("Update")
            .field("chat_id", Int53)
            .field("message_ids", vector(Int53))
            .optional("is_permanent", Bool)
            .optional("from_cache", Bool),
        Schema::object("updateChatTitle")
            .of("Update")
            .field("chat_id", Int53)
            .field("title", string()),
        Schema::object("updateChatReadInbox")
            .of("Update")
            .field("chat_id", Int53)
            .field("last_read_inbox_message_id", Int53)
            .field("unread_count", Int32),
        Schema::object("updateUser")
            .of("Update")
            .field("user", object("user")),
        Schema::object("updateOption")
            .of("Update")
            .field("name", string())
            .field("value", object("OptionValue")),
        Schema::object("updateConnectionState")
            .of("Update")
            .field("state", object("ConnectionState")),
    ]
}

fn lifecycle_functions() -> Vec<Schema> {
    let qr_states = [
        WaitPhoneNumber,
        WaitPremiumPurchase,
        WaitEmailAddress,
        WaitEmailCode,
        WaitCode,
        WaitRegistration,
        WaitPassword,
    ];
    let mut logged_in = AuthorizationState::LOGIN.to_vec();
    logged_in.push(Ready);

    vec![
        Schema::function("getAuthorizationState", "AuthorizationState"),
        Schema::function("setTdlibParameters", "ok")
            .admit(Admission::BeforeInit)
            .optional("use_test_dc", Bool)
            .optional("database_directory", string())
            .optional("files_directory", string())
            .optional("database_encryption_key", Bytes)
            .optional("use_file_database", Bool)
            .optional("use_chat_info_database", Bool)
            .optional("use_message_database", Bool)
            .optional("use_secret_chats", Bool)
            .field("api_id", Int32)
            .field("api_hash", string())
            .field("system_language_code", string())
            .field("device_model", string())
            .optional("system_version", string())
            .field("application_version", string()),
        Schema::function("setAuthenticationPhoneNumber", "ok")
            .admit(only(&[WaitPhoneNumber]))
            .field("phone_number", string())
            .optional("settings", object("phoneNumberAuthenticationSettings")),
        Schema::function("setAuthenticationEmailAddress", "ok")
            .admit(only(&[WaitEmailAddress]))
            .field("email_address", string()),
        Schema::function("checkAuthenticationEmailCode", "ok")
            .admit(only(&[WaitEmailCode]))
            .field("code", object("EmailAddressAuthentication")),
        Schema::function("resendAuthenticationCode", "ok").admit(only(&[WaitCode])),
        Schema::function("checkAuthenticationCode", "ok")
            .admit(only(&[WaitCode]))
            .field("code", string()),
        Schema::function("requestQrCodeAuthentication", "ok")
            .admit(only(&qr_states))
            .optional("other_user_ids", vector(Int53)),
        Schema::function("registerUser", "ok")
            .admit(only(&[WaitRegistration]))
            .field("first_name", string())
            .optional("last_name", string())
            .optional("disable_notification", Bool),
        Schema::function("checkAuthenticationPassword", "ok")
            .admit(only(&[WaitPassword]))
            .field("password", string()),
        Schema::function("requestAuthenticationPasswordRecovery", "ok")
            .admit(only(&[WaitPassword])),
        Schema::function("checkAuthenticationPasswordRecoveryCode", "ok")
            .admit(only(&[WaitPassword]))
            .field("recovery_code", string()),
        Schema::function("recoverAuthenticationPassword", "ok")
            .admit(only(&[WaitPassword]))
            .field("recovery_code", string())
            .optional("new_password", string())
            .optional("new_hint", string()),
        Schema::function("checkAuthenticationBotToken", "ok")
            .admit(only(&[WaitPhoneNumber]))
            .field("token", string()),
        Schema::function("checkAuthenticationPremiumPurchase", "ok")
            .admit(only(&[WaitPremiumPurchase]))
            .field("currency", string())
            .field("amount", Int53),
        Schema::function("logOut", "ok").admit(Admission::InStates(logged_in)),
        Schema::function("close", "ok"),
        Schema::function("destroy", "ok"),
    ]
}

fn query_functions() -> Vec<Schema> {
    let ready = Admission::ready;
    vec![
        Schema::function("getOption", "OptionValue").field("name", string()),
        Schema::function("setOption", "ok")
            .field("name", string())
            .optional("value", object("OptionValue")),
        Schema::function("getMe", "user").admit(ready()),
        Schema::function("getUser", "user")
            .admit(ready())
            .field("user_id", Int53),
        Schema::function("getChat", "chat")
            .admit(ready())
            .field("chat_id", Int53),
        Schema::function("getChats", "chats")
            .admit(ready())
            .optional("chat_list", object("ChatList"))
            .field("limit", Int32),
        Schema::function("loadChats", "ok")
            .admit(ready())
            .optional("chat_list", object("ChatList"))
            .field("limit", Int32),
        Schema::function("setChatTitle", "ok")
            .admit(ready())
            .field("chat_id", Int53)
            .field("title", string()),
        Schema::function("getChatHistory", "messages")
            .admit(ready())
            .field("chat_id", Int53)
            .optional("from_message_id", Int53)
            .optional("offset", Int32)
            .field("limit", Int32)
            .optional("only_local", Bool),
        Schema::function("sendMessage", "message")
            .admit(ready())
            .field("chat_id", Int53)
            .optional("message_thread_id", Int53)
            .field("input_message_content", object("InputMessageContent")),
        Schema::function("deleteMessages", "ok")
            .admit(ready())
            .field("chat_id", Int53)
            .field("message_ids", vector(Int53))
            .optional("revoke", Bool),
        Schema::function("viewMessages", "ok")
            .admit(ready())
            .field("chat_id", Int53)
            .field("message_ids", vector(Int53))
            .optional("force_read", Bool),
        Schema::function("getPasswordRecoveryInfo", "passwordRecoveryInfo").admit(only(&[
            WaitPassword,
            Ready,
        ])),
    ]
}

fn local_functions() -> Vec<Schema> {
    vec![
        Schema::function("getTextEntities", "textEntities")
            .local()
            .field("text", string()),
        Schema::function("parseTextEntities", "formattedText")
            .local()
            .field("text", string())
            .field("parse_mode", object("TextParseMode")),
        Schema::function("parseMarkdown", "formattedText")
            .local()
            .field("text", object("formattedText")),
        Schema::function("getMarkdownText", "formattedText")
            .local()
            .field("text", object("formattedText")),
        Schema::function("cleanFileName", "text")
            .local()
            .field("file_name", string()),
        Schema::function("getFileMimeType", "text")
            .local()
            .field("file_name", string()),
        Schema::function("getFileExtension", "text")
            .local()
            .field("mime_type", string()),
        Schema::function("setLogVerbosityLevel", "ok")
            .local()
            .field("new_verbosity_level", Int32),
        Schema::function("getLogVerbosityLevel", "logVerbosityLevel").local(),
        Schema::function("addLogMessage", "ok")
            .local()
            .field("verbosity_level", Int32)
            .field("text", string()),
    ]
}

fn test_functions() -> Vec<Schema> {
    vec![
        Schema::function("testCallEmpty", "ok"),
        Schema::function("testCallString", "testString").field("x", string()),
        Schema::function("testCallBytes", "testBytes").field("x", Bytes),
        Schema::function("testCallVectorInt", "testVectorInt").field("x", vector(Int32)),
        Schema::function("testSquareInt", "testInt").field("x", Int32),
        Schema::function("testNetwork", "ok"),
        Schema::function("testUseUpdate", "Update"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_matches_declaration() {
        let declared: HashSet<&str> = DECLARED_TAGS.iter().copied().collect();
        let built: HashSet<String> = schemas().iter().map(|s| s.tag().to_string()).collect();
        assert_eq!(declared.len(), DECLARED_TAGS.len(), "duplicate declaration");
        assert_eq!(built.len(), declared.len());
        for tag in &declared {
            assert!(built.contains(*tag), "no schema for {tag}");
        }
    }

    #[test]
    fn test_every_authorization_state_is_declared() {
        let registry = TypeRegistry::builtin().unwrap();
        let members = registry.class_members("AuthorizationState").unwrap();
        assert_eq!(members.len(), AuthorizationState::ALL.len());
        for state in AuthorizationState::ALL {
            assert!(members.contains(state.tag()));
        }
    }

    #[test]
    fn test_every_update_is_named_as_update() {
        let registry = TypeRegistry::builtin().unwrap();
        for tag in registry.class_members("Update").unwrap() {
            assert!(crate::wire::is_update_tag(tag), "{tag}");
        }
    }

    #[test]
    fn test_admission_table() {
        let registry = TypeRegistry::builtin().unwrap();
        let admission = |tag: &str| registry.resolve(tag).unwrap().admission().unwrap().clone();

        assert_eq!(admission("setTdlibParameters"), Admission::BeforeInit);
        assert_eq!(admission("getMe"), Admission::ready());
        assert_eq!(admission("close"), Admission::Always);
        assert!(admission("logOut").admits(Some(WaitCode)));
        assert!(!admission("logOut").admits(Some(Closing)));
        assert!(registry.resolve("getFileMimeType").unwrap().is_local());
        assert!(!registry.resolve("getMe").unwrap().is_local());
    }
}
