//! Player commands read from stdin.

use anyhow::{Context, bail};
use peril::prelude::{Location, UnitRank};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Spawn { location: Location, rank: UnitRank },
    Move { location: Location, ids: Vec<u32> },
    Status,
    Spam(usize),
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines are `Ok(None)`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, rest)) = words.split_first() else {
            return Ok(None);
        };

        let command = match name.to_lowercase().as_str() {
            "spawn" => match rest {
                [location, rank] => Self::Spawn {
                    location: location.parse()?,
                    rank: rank.parse()?,
                },
                _ => bail!("usage: spawn <location> <rank>"),
            },
            "move" => match rest {
                [location, ids @ ..] if !ids.is_empty() => Self::Move {
                    location: location.parse()?,
                    ids: ids
                        .iter()
                        .map(|id| id.parse::<u32>().with_context(|| format!("{id} is not a unit id")))
                        .collect::<anyhow::Result<_>>()?,
                },
                _ => bail!("usage: move <location> <unit id>..."),
            },
            "status" => Self::Status,
            "spam" => match rest {
                [count] => Self::Spam(
                    count
                        .parse::<usize>()
                        .with_context(|| format!("{count} is not a number"))?,
                ),
                _ => bail!("usage: spam <count>"),
            },
            "help" => Self::Help,
            "quit" => Self::Quit,
            other => bail!("unknown command '{other}', try 'help'"),
        };
        Ok(Some(command))
    }
}

pub fn print_help() {
    let locations: Vec<&str> = Location::ALL.iter().map(|l| l.as_str()).collect();
    let ranks: Vec<&str> = UnitRank::ALL.iter().map(|r| r.as_str()).collect();

    println!("Possible commands:");
    println!("* spawn <location> <rank>");
    println!("    locations: {}", locations.join(", "));
    println!("    ranks: {}", ranks.join(", "));
    println!("* move <location> <unit id> <unit id> ...");
    println!("* status");
    println!("* spam <count>");
    println!("* help");
    println!("* quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spawn() {
        assert_eq!(
            Command::parse("spawn europe artillery").unwrap(),
            Some(Command::Spawn {
                location: Location::Europe,
                rank: UnitRank::Artillery,
            })
        );
    }

    #[test]
    fn test_parse_move_with_several_units() {
        assert_eq!(
            Command::parse("  move asia 1 2 3 ").unwrap(),
            Some(Command::Move {
                location: Location::Asia,
                ids: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("status").unwrap(), Some(Command::Status));
        assert_eq!(Command::parse("SPAM 4").unwrap(), Some(Command::Spam(4)));
        assert_eq!(Command::parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("spawn mars infantry").is_err());
        assert!(Command::parse("spawn europe general").is_err());
        assert!(Command::parse("spawn europe").is_err());
        assert!(Command::parse("move europe").is_err());
        assert!(Command::parse("move europe one").is_err());
        assert!(Command::parse("spam lots").is_err());
        assert!(Command::parse("retreat").is_err());
    }
}
