use bytes::Bytes;
use rml_amf0::Amf0Value;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError, RtmpMessage};

pub fn serialize(values: &Vec<Amf0Value>) -> Result<Bytes, MessageSerializationError> {
    let bytes = rml_amf0::serialize(values)?;
    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let values = rml_amf0::deserialize(&mut cursor)?;

    Ok(RtmpMessage::Amf0Data { values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_data_values() {
        let values = vec![
            Amf0Value::Utf8String("@setDataFrame".to_string()),
            Amf0Value::Number(23.0),
        ];

        let bytes = rml_amf0::serialize(&values).unwrap();
        let message = deserialize(&bytes[..]).unwrap();

        assert_eq!(message, RtmpMessage::Amf0Data { values });
    }
}
