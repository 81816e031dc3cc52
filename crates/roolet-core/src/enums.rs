/// Session role declared at registration (`spec.md` §6 GLOSSARY "Group").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupConnection {
    Server = 1,
    Client = 2,
    WsClient = 3,
}

impl GroupConnection {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            1 => GroupConnection::Server,
            2 => GroupConnection::Client,
            3 => GroupConnection::WsClient,
            _ => return None,
        })
    }
}
