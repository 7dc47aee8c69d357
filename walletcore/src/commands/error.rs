use std::fmt;

#[derive(Debug)]
pub enum CommandError {
    UnknownCommand(String),
    ArgsNotJson(json::Error),
    SingleArgNotJsonArray(String),
    JsonArrayNotObj(String),
    EmptyJsonArray,
    ParseIntFromString(std::num::ParseIntError),
    UnexpectedType(String),
    MissingKey(String),
    InvalidArguments,
    InvalidMemo(String),
    NonJsonNumberForAmount(String),
    InvalidOption(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CommandError::*;

        match self {
            UnknownCommand(cmd) => write!(
                f,
                "Unknown command : {}. Type 'help' for a list of commands",
                cmd
            ),
            ArgsNotJson(e) => write!(f, "failed to parse argument. {}", e),
            SingleArgNotJsonArray(e) => {
                write!(f, "argument cannot be parsed to a json array. {}", e)
            }
            JsonArrayNotObj(e) => {
                write!(f, "argument cannot be a json array. {}", e)
            }
            EmptyJsonArray => write!(f, "json array has no arguments"),
            ParseIntFromString(e) => write!(f, "failed to parse argument. {}", e),
            UnexpectedType(e) => write!(f, "arguments cannot be parsed to expected type. {}", e),
            MissingKey(key) => write!(f, "json array is missing \"{}\" key.", key),
            InvalidArguments => write!(f, "arguments given are invalid."),
            InvalidMemo(e) => write!(f, "failed to interpret memo. {}", e),
            NonJsonNumberForAmount(e) => write!(f, "invalid argument. expected a number. {}", e),
            InvalidOption(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {}
