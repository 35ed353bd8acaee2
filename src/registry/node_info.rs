use crate::constants::LONG_STRING_TAG;
use crate::constants::SHORT_STRING_TAG;
use crate::constants::STREAM_MAGIC;

/// Decodes a node payload that may be wrapped in a legacy object-stream
/// frame: magic `0xACED`, then a string tag at offset 4. Short strings carry
/// their content from offset 7, long strings from offset 13. Payloads
/// without a well-formed frame are returned verbatim as UTF-8.
pub(crate) fn decode_node_info(data: &[u8]) -> String {
    if data.len() > 7 && u16::from_be_bytes([data[0], data[1]]) == STREAM_MAGIC {
        if data[4] == SHORT_STRING_TAG {
            return String::from_utf8_lossy(&data[7..]).into_owned();
        }
        if data[4] == LONG_STRING_TAG && data.len() > 13 {
            return String::from_utf8_lossy(&data[13..]).into_owned();
        }
    }
    String::from_utf8_lossy(data).into_owned()
}
