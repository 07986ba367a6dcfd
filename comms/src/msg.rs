use std::{borrow::Cow, io};

use crate::specs::command::{Command, Reply};

pub(crate) type Header = u32;

const ERR: Header = 0;
const CONTROL: Header = 1;
const REPLY: Header = 2;

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Reply(Reply),
    Err(Cow<'a, str>),
}

impl<'a> Msg<'a> {
    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }

    /// A short name for the message's kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(_) => "control",
            Msg::Reply(_) => "reply",
            Msg::Err(_) => "err",
        }
    }

    pub(crate) fn header(&self) -> Header {
        match self {
            Msg::Err(_) => ERR,
            Msg::Control(_) => CONTROL,
            Msg::Reply(_) => REPLY,
        }
    }

    /// Appends the body of this message to `buf`.
    pub(crate) fn encode(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Msg::Err(e) => buf.extend_from_slice(e.as_bytes()),
            Msg::Control(cmd) => serde_json::to_writer(buf, cmd)?,
            Msg::Reply(reply) => serde_json::to_writer(buf, reply)?,
        }

        Ok(())
    }

    /// Decodes the body of a frame of the given `kind`.
    pub(crate) fn decode(kind: Header, body: &'a [u8]) -> io::Result<Self> {
        match kind {
            ERR => {
                let string = str::from_utf8(body)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL => Ok(Self::Control(serde_json::from_slice(body)?)),
            REPLY => Ok(Self::Reply(serde_json::from_slice(body)?)),
            kind => Self::invalid_kind(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::{
        command::{Arg, Method, Value},
        object::{ObjectSpec, TensorSpec},
    };

    fn encode(msg: &Msg<'_>) -> (Header, Vec<u8>) {
        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();
        (msg.header(), buf)
    }

    #[test]
    fn test_control_keeps_command_fields() {
        let tensor = TensorSpec {
            shape: vec![2],
            data: vec![1.0, 2.0],
            requires_grad: true,
            grad: Some(vec![0.5, 0.5]),
        };

        let cmd = Command::Execute {
            target: 7,
            path: Some("child".into()),
            method: Method::Add,
            args: vec![Arg::Inline(ObjectSpec::Native(tensor.clone()))],
            result_id: 9,
        };

        let (kind, buf) = encode(&Msg::Control(cmd));
        let Msg::Control(Command::Execute {
            target,
            path,
            method,
            args,
            result_id,
        }) = Msg::decode(kind, &buf).unwrap()
        else {
            panic!("unexpected message");
        };

        assert_eq!((target, result_id), (7, 9));
        assert_eq!(path.as_deref(), Some("child"));
        assert_eq!(method, Method::Add);
        assert_eq!(args, vec![Arg::Inline(ObjectSpec::Native(tensor))]);
    }

    #[test]
    fn test_reply_and_err() {
        let (kind, buf) = encode(&Msg::Reply(Reply::Value(Value::Bool(true))));
        assert!(matches!(
            Msg::decode(kind, &buf).unwrap(),
            Msg::Reply(Reply::Value(Value::Bool(true)))
        ));

        let (kind, buf) = encode(&Msg::Err(Cow::Borrowed("boom")));
        let Msg::Err(text) = Msg::decode(kind, &buf).unwrap() else {
            panic!("unexpected message");
        };
        assert_eq!(text, "boom");
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Msg::decode(42, b"{}").is_err());
        assert!(Msg::decode(CONTROL, b"not json").is_err());
    }
}
