//! Console command parser. One line in, one `Msg` (or a local action) out.

use takeoff_core::{ItemKey, ItemKind, Msg};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  run | reprocess | refresh          start a run, reprocess with corrections, reload results
  select <F|K>:<id> [plan]           open the overlay for an item
  toggle <idx>                       reject / restore a detection
  add <px> <py> <w> <h>              add a marker at a pixel of a w x h rendering
  unadd <idx>                        remove an added marker
  click <px> <py> <w> <h>            background click (adds in add mode, else closes)
  addmode | next | prev | close      overlay controls
  count <F|K>:<id> <plan> <n>        override a count
  field <F|K>:<id> <name> <value..>  edit a spec field
  new <F|K>:<id> | drop <F|K>:<id>   add or remove an item
  diff                               compare with the original results
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Msg),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid item `{0}`; expected F:<id> or K:<id>")]
    ItemKey(String),
    #[error("invalid number `{0}`")]
    Number(String),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(CommandError::Empty);
    };
    let args: Vec<&str> = words.collect();

    let msg = match verb {
        "quit" | "exit" => return Ok(Command::Quit),
        "help" | "?" => return Ok(Command::Help),
        "run" => Msg::RunRequested,
        "reprocess" => Msg::ReprocessRequested,
        "refresh" => Msg::ResultsRefreshRequested,
        "select" => match args.as_slice() {
            [item] => Msg::ItemSelected {
                item: parse_item(item)?,
                plan: None,
            },
            [item, plan] => Msg::ItemSelected {
                item: parse_item(item)?,
                plan: Some((*plan).to_string()),
            },
            _ => return Err(CommandError::Usage("select <F|K>:<id> [plan]")),
        },
        "toggle" => match args.as_slice() {
            [index] => Msg::DetectionToggled {
                index: parse_number(index)?,
            },
            _ => return Err(CommandError::Usage("toggle <idx>")),
        },
        "unadd" => match args.as_slice() {
            [index] => Msg::AddedMarkerRemoved {
                index: parse_number(index)?,
            },
            _ => return Err(CommandError::Usage("unadd <idx>")),
        },
        "add" => {
            let [px, py, width, height] = parse_click(&args, "add <px> <py> <w> <h>")?;
            Msg::MarkerAddedAt {
                px,
                py,
                rendered_width: width,
                rendered_height: height,
            }
        }
        "click" => {
            let [px, py, width, height] = parse_click(&args, "click <px> <py> <w> <h>")?;
            Msg::OverlayBackgroundClicked {
                px,
                py,
                rendered_width: width,
                rendered_height: height,
            }
        }
        "addmode" => Msg::AddModeToggled,
        "next" => Msg::NextPlan,
        "prev" => Msg::PreviousPlan,
        "close" => Msg::OverlayDismissed,
        "count" => match args.as_slice() {
            [item, plan, value] => Msg::CountEdited {
                item: parse_item(item)?,
                plan: (*plan).to_string(),
                value: parse_number(value)?,
            },
            _ => return Err(CommandError::Usage("count <F|K>:<id> <plan> <n>")),
        },
        "field" => match args.as_slice() {
            [item, field, value @ ..] if !value.is_empty() => Msg::FieldEdited {
                item: parse_item(item)?,
                field: (*field).to_string(),
                value: value.join(" "),
            },
            _ => return Err(CommandError::Usage("field <F|K>:<id> <name> <value..>")),
        },
        "new" => match args.as_slice() {
            [item] => Msg::ItemAdded {
                item: parse_item(item)?,
            },
            _ => return Err(CommandError::Usage("new <F|K>:<id>")),
        },
        "drop" => match args.as_slice() {
            [item] => Msg::ItemRemoved {
                item: parse_item(item)?,
            },
            _ => return Err(CommandError::Usage("drop <F|K>:<id>")),
        },
        "diff" => Msg::CompareWithOriginalRequested,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Command::Dispatch(msg))
}

fn parse_item(text: &str) -> Result<ItemKey, CommandError> {
    let invalid = || CommandError::ItemKey(text.to_string());
    let (prefix, identifier) = text.split_once(':').ok_or_else(invalid)?;
    if identifier.is_empty() {
        return Err(invalid());
    }
    let kind = match prefix {
        "F" | "f" => ItemKind::Fixture,
        "K" | "k" => ItemKind::Keynote,
        _ => return Err(invalid()),
    };
    Ok(ItemKey::new(kind, identifier))
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, CommandError> {
    text.parse()
        .map_err(|_| CommandError::Number(text.to_string()))
}

fn parse_click(args: &[&str], usage: &'static str) -> Result<[f64; 4], CommandError> {
    let [px, py, width, height] = args else {
        return Err(CommandError::Usage(usage));
    };
    let value = |text: &str| -> Result<f64, CommandError> {
        let number: f64 = parse_number(text)?;
        if number.is_finite() {
            Ok(number)
        } else {
            Err(CommandError::Number(text.to_string()))
        }
    };
    Ok([value(*px)?, value(*py)?, value(*width)?, value(*height)?])
}
