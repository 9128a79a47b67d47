use bytes::Bytes;
use rml_amf0::Amf0Value;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError, RtmpMessage};

/// An AMF0 encoded command, such as `connect`, `play` or `onStatus`.
///
/// On the wire a command is a list of AMF0 values: the command name, the transaction id, the
/// command object and then any number of additional arguments.
#[derive(PartialEq, Debug, Clone)]
pub struct Amf0Command {
    pub name: String,
    pub transaction_id: f64,

    /// `Amf0Value::Null` when the command carries no object
    pub command_object: Amf0Value,
    pub arguments: Vec<Amf0Value>,
}

impl Amf0Command {
    pub fn new(
        name: impl Into<String>,
        transaction_id: f64,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
    ) -> Amf0Command {
        Amf0Command {
            name: name.into(),
            transaction_id,
            command_object,
            arguments,
        }
    }

    /// Encodes the command as the payload of a type 20 message
    pub fn serialize(&self) -> Result<Bytes, MessageSerializationError> {
        let mut values = Vec::with_capacity(self.arguments.len() + 3);
        values.push(Amf0Value::Utf8String(self.name.clone()));
        values.push(Amf0Value::Number(self.transaction_id));
        values.push(self.command_object.clone());
        values.extend(self.arguments.iter().cloned());

        let bytes = rml_amf0::serialize(&values)?;
        Ok(Bytes::from(bytes))
    }

    /// Case insensitive comparison against the command name
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Looks up a string property on the command object, or the first object argument when the
    /// command object is null (as `onStatus` and `_error` responses usually do it).
    pub fn info_property(&self, property: &str) -> Option<&str> {
        let objects = std::iter::once(&self.command_object).chain(self.arguments.iter());
        for value in objects {
            if let Amf0Value::Object(properties) = value {
                if let Some(Amf0Value::Utf8String(text)) = properties.get(property) {
                    return Some(text.as_str());
                }
            }
        }

        None
    }
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let values = rml_amf0::deserialize(&mut cursor)?;
    let mut values = values.into_iter();

    let name = match values.next() {
        Some(Amf0Value::Utf8String(name)) => name,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let transaction_id = match values.next() {
        Some(Amf0Value::Number(id)) => id,
        _ => return Err(MessageDeserializationError::InvalidMessageFormat),
    };

    let command_object = values.next().unwrap_or(Amf0Value::Null);

    Ok(RtmpMessage::Amf0Command(Amf0Command {
        name,
        transaction_id,
        command_object,
        arguments: values.collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn can_serialize_command() {
        let mut properties = HashMap::new();
        properties.insert("app".to_string(), Amf0Value::Utf8String("live".to_string()));

        let command = Amf0Command::new(
            "connect",
            1.0,
            Amf0Value::Object(properties.clone()),
            vec![Amf0Value::Boolean(true)],
        );

        let bytes = command.serialize().unwrap();
        let values = rml_amf0::deserialize(&mut Cursor::new(&bytes[..])).unwrap();

        assert_eq!(
            values,
            vec![
                Amf0Value::Utf8String("connect".to_string()),
                Amf0Value::Number(1.0),
                Amf0Value::Object(properties),
                Amf0Value::Boolean(true),
            ]
        );
    }

    #[test]
    fn can_deserialize_command() {
        let values = vec![
            Amf0Value::Utf8String("play".to_string()),
            Amf0Value::Number(0.0),
            Amf0Value::Null,
            Amf0Value::Utf8String("stream".to_string()),
            Amf0Value::Number(-2000.0),
        ];

        let bytes = rml_amf0::serialize(&values).unwrap();
        let expected = Amf0Command::new(
            "play",
            0.0,
            Amf0Value::Null,
            vec![
                Amf0Value::Utf8String("stream".to_string()),
                Amf0Value::Number(-2000.0),
            ],
        );

        assert_eq!(deserialize(&bytes[..]).unwrap(), RtmpMessage::Amf0Command(expected));
    }

    #[test]
    fn missing_command_object_decodes_as_null() {
        let values = vec![
            Amf0Value::Utf8String("onBWDone".to_string()),
            Amf0Value::Number(0.0),
        ];

        let bytes = rml_amf0::serialize(&values).unwrap();
        match deserialize(&bytes[..]).unwrap() {
            RtmpMessage::Amf0Command(command) => {
                assert_eq!(command.command_object, Amf0Value::Null);
                assert!(command.arguments.is_empty());
            }

            x => panic!("Expected command, instead got {:?}", x),
        }
    }

    #[test]
    fn non_string_name_is_invalid() {
        let values = vec![Amf0Value::Number(5.0), Amf0Value::Number(1.0)];
        let bytes = rml_amf0::serialize(&values).unwrap();

        match deserialize(&bytes[..]) {
            Err(MessageDeserializationError::InvalidMessageFormat) => (),
            x => panic!("Expected InvalidMessageFormat, instead got {:?}", x),
        }
    }

    #[test]
    fn missing_transaction_id_is_invalid() {
        let values = vec![Amf0Value::Utf8String("_result".to_string())];
        let bytes = rml_amf0::serialize(&values).unwrap();

        match deserialize(&bytes[..]) {
            Err(MessageDeserializationError::InvalidMessageFormat) => (),
            x => panic!("Expected InvalidMessageFormat, instead got {:?}", x),
        }
    }

    #[test]
    fn info_property_checks_arguments_when_object_is_null() {
        let mut info = HashMap::new();
        info.insert(
            "code".to_string(),
            Amf0Value::Utf8String("NetStream.Play.Start".to_string()),
        );

        let command = Amf0Command::new("onStatus", 0.0, Amf0Value::Null, vec![Amf0Value::Object(info)]);
        assert_eq!(command.info_property("code"), Some("NetStream.Play.Start"));
        assert_eq!(command.info_property("level"), None);
        assert!(command.is_named("ONSTATUS"));
    }
}
