//! Tests for error handling

use symtype_core::error::{KeyComponent, SymtypeError, SymtypeResult};
use symtype_core::provider::NativeError;
use symtype_core::types::{ModuleBase, ProcessHandle, SymTag, TypeId, TypeKey};

fn key() -> TypeKey
{
    TypeKey::new(ProcessHandle::new(0x10), ModuleBase::new(0x40_0000), TypeId::new(0x22))
}

#[test]
fn test_key_not_found_names_component()
{
    let error = SymtypeError::KeyNotFound {
        key: key(),
        component: KeyComponent::Module,
    };
    let message = format!("{}", error);
    assert!(message.contains("No module entry"));
    assert!(message.contains("type 0x22"));
    assert!(error.is_not_found());
    assert!(!error.is_retryable());
}

#[test]
fn test_wrong_kind_message()
{
    let error = SymtypeError::WrongKind {
        key: key(),
        expected: SymTag::Udt,
        actual: SymTag::Enum,
    };
    let message = format!("{}", error);
    assert!(message.contains("Enum record, expected Udt"));
}

#[test]
fn test_incomplete_message_shows_masks()
{
    let error = SymtypeError::Incomplete {
        key: key(),
        kind: SymTag::Udt,
        required: 0x4f,
        valid: 0x4b,
    };
    let message = format!("{}", error);
    assert!(message.contains("0x4f"));
    assert!(message.contains("0x4b"));
}

#[test]
fn test_transport_failure_keeps_native_code()
{
    let error = SymtypeError::TransportFailure {
        code: Some(NativeError::MOD_NOT_FOUND),
        context: "type query".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("type query"));
    assert!(message.contains("ERROR_MOD_NOT_FOUND"));
    assert_eq!(error.native_code(), Some(NativeError::MOD_NOT_FOUND));
    assert!(error.is_retryable());

    let bare = SymtypeError::TransportFailure {
        code: None,
        context: "could not fetch all arguments".to_string(),
    };
    assert_eq!(bare.to_string(), "Symbol store call failed: could not fetch all arguments");
}

#[test]
fn test_io_error_conversion()
{
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "fixture missing");
    let error: SymtypeError = io_error.into();
    let message = format!("{}", error);
    assert!(message.contains("IO error"));
}

#[test]
fn test_json_error_conversion()
{
    let json_error = serde_json::from_str::<u32>("not json").unwrap_err();
    let error: SymtypeError = json_error.into();
    assert!(format!("{}", error).contains("JSON error"));
}

#[test]
fn test_result_alias()
{
    fn might_fail(fail: bool) -> SymtypeResult<u32>
    {
        if fail {
            Err(SymtypeError::ResourceExhausted("synthetic ids".to_string()))
        } else {
            Ok(42)
        }
    }

    assert_eq!(might_fail(false).unwrap(), 42);
    assert!(might_fail(true).is_err());
}
