use std::path::PathBuf;
use std::str::FromStr;

use skylink_proto::Mode;

pub const HELP: &str = "\
commands:
  offboard | land      request a flight mode (waits for the drone's ack)
  load <file.json>     replace the active waypoints from a JSON array
  send                 upload the active waypoints
  remove <n>           drop waypoint n (1-based)
  list                 show the active waypoints
  status               link state and last ack
  stop                 end the session and exit";

/// One line typed by the operator while `run` is active.
#[derive(Debug, PartialEq)]
pub enum OperatorCmd {
    Mode(Mode),
    Load(PathBuf),
    Send,
    Remove(usize),
    List,
    Status,
    Help,
    Stop,
}

impl FromStr for OperatorCmd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next();

        match (verb.as_str(), arg) {
            ("offboard", None) | ("land", None) => verb.parse().map(OperatorCmd::Mode),
            ("load", Some(path)) => Ok(OperatorCmd::Load(PathBuf::from(path))),
            ("send", None) => Ok(OperatorCmd::Send),
            ("remove", Some(n)) => n
                .parse()
                .map(OperatorCmd::Remove)
                .map_err(|_| format!("remove: not an index: {}", n)),
            ("list", None) => Ok(OperatorCmd::List),
            ("status", None) => Ok(OperatorCmd::Status),
            ("help", _) | ("?", _) => Ok(OperatorCmd::Help),
            ("stop", None) | ("quit", None) => Ok(OperatorCmd::Stop),
            _ => Err(format!("unknown command: {} (try `help`)", s.trim())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_lines() {
        assert_eq!("LAND".parse(), Ok(OperatorCmd::Mode(Mode::Land)));
        assert_eq!(" offboard ".parse(), Ok(OperatorCmd::Mode(Mode::Offboard)));
        assert_eq!("remove 3".parse(), Ok(OperatorCmd::Remove(3)));
        assert_eq!("load route.json".parse(), Ok(OperatorCmd::Load(PathBuf::from("route.json"))));
        assert_eq!("quit".parse(), Ok(OperatorCmd::Stop));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!("remove".parse::<OperatorCmd>().is_err());
        assert!("remove two".parse::<OperatorCmd>().is_err());
        assert!("land now".parse::<OperatorCmd>().is_err());
        assert!("hover".parse::<OperatorCmd>().is_err());
    }
}
