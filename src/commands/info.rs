use bytes::Bytes;
use itertools::Itertools;
use std::env::consts::{ARCH, OS};
use std::process;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Role;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

const REDIS_VERSION: &str = "7.2.4";

/// No replication takes place, so the replication id is fixed.
const MASTER_REPLID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

/// Returns information about the server. Only the `server` and `replication` sections are
/// available; asking for any other section replies with nothing for it.
///
/// Ref: <https://redis.io/docs/latest/commands/info/>
#[derive(Debug, PartialEq)]
pub struct Info {
    /// Lowercased section names. Empty means the default sections.
    pub sections: Vec<String>,
}

impl Executable for Info {
    async fn exec(self, store: &Store) -> Result<Frame, Error> {
        let default = self.sections.is_empty()
            || self
                .sections
                .iter()
                .any(|section| matches!(&section[..], "all" | "default" | "everything"));

        let sections: Vec<String> = if default {
            vec![server(), replication(store.role())]
        } else {
            self.sections
                .iter()
                .unique()
                .filter_map(|section| match &section[..] {
                    "server" => Some(server()),
                    "replication" => Some(replication(store.role())),
                    _ => None,
                })
                .collect()
        };

        Ok(Frame::Bulk(Bytes::from(sections.join("\r\n"))))
    }
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut sections = Vec::with_capacity(parser.remaining());
        while parser.remaining() > 0 {
            sections.push(parser.next_string()?.to_lowercase());
        }

        Ok(Self { sections })
    }
}

fn server() -> String {
    format!(
        "# Server\r\n\
         redis_version:{}\r\n\
         redis_mode:standalone\r\n\
         os:{} {}\r\n\
         arch_bits:{}\r\n\
         process_id:{}\r\n",
        REDIS_VERSION,
        OS,
        ARCH,
        usize::BITS,
        process::id()
    )
}

fn replication(role: &Role) -> String {
    match role {
        Role::Master => format!(
            "# Replication\r\n\
             role:master\r\n\
             connected_slaves:0\r\n\
             master_replid:{}\r\n\
             master_repl_offset:0\r\n",
            MASTER_REPLID
        ),
        Role::Replica(master) => format!(
            "# Replication\r\n\
             role:slave\r\n\
             master_host:{}\r\n\
             master_port:{}\r\n\
             master_link_status:down\r\n",
            master.host, master.port
        ),
    }
}
