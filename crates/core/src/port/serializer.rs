// Command Serializer Port

use crate::domain::{Command, CommandPayload};
use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

const TAG_KEY: &str = "name";
const CONTENT_KEY: &str = "payload";

/// Converts commands to and from the payload stored in an envelope
///
/// The envelope already carries the command name, so the payload holds the
/// command's fields only and `deserialize` is told which command to rebuild.
pub trait CommandSerializer<C: Command>: Send + Sync {
    fn serialize(&self, command: &C) -> Result<CommandPayload>;

    fn deserialize(&self, payload: &CommandPayload, name: &str) -> Result<C>;
}

/// JSON serializer for adjacently tagged command enums
///
/// The command type must be declared as
/// `#[serde(tag = "name", content = "payload")]` so that the serde tag equals
/// `Command::name()`:
///
/// ```text
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "name", content = "payload")]
/// enum MovieCommand {
///     RentMovie { title: String },
/// }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl<C> CommandSerializer<C> for JsonSerializer
where
    C: Command + Serialize + DeserializeOwned,
{
    fn serialize(&self, command: &C) -> Result<CommandPayload> {
        let mut fields = match serde_json::to_value(command)? {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Serialization(format!(
                    "command {} did not serialize to a tagged object: {}",
                    command.name(),
                    other
                )))
            }
        };

        match fields.remove(TAG_KEY) {
            Some(Value::String(tag)) if tag == command.name() => {}
            Some(tag) => {
                return Err(AppError::Serialization(format!(
                    "serde tag {} does not match command name {}",
                    tag,
                    command.name()
                )))
            }
            None => {
                return Err(AppError::Serialization(format!(
                    "command {} has no \"{}\" tag",
                    command.name(),
                    TAG_KEY
                )))
            }
        }

        // Unit variants carry no content
        let payload = fields.remove(CONTENT_KEY).unwrap_or(Value::Null);
        Ok(CommandPayload::new(payload))
    }

    fn deserialize(&self, payload: &CommandPayload, name: &str) -> Result<C> {
        let mut tagged = Map::new();
        tagged.insert(TAG_KEY.to_string(), Value::String(name.to_string()));
        if !payload.as_value().is_null() {
            tagged.insert(CONTENT_KEY.to_string(), payload.as_value().clone());
        }

        serde_json::from_value(Value::Object(tagged)).map_err(|e| {
            AppError::Serialization(format!("cannot rebuild command {}: {}", name, e))
        })
    }
}
