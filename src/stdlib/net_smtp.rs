//! `net/smtp` unit
//!
//! Exposes the [`mail`](crate::mail) client to interpreted programs.
//!
//! | Symbol | Kind |
//! |---|---|
//! | `CRAMMD5Auth`, `Dial`, `NewClient`, `PlainAuth`, `SendMail` | function |
//! | `Auth`, `Client`, `ServerInfo` | type |
//! | `_Auth` | interface wrapper (`_net_smtp_Auth`) |
//!
//! Library errors come back as error values in the last result position.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::carrier::{FuncSignature, TypeDescriptor, TypeRef};
use crate::error::{BridgeError, BridgeResult};
use crate::mail::{self, Auth, Client, Conn, ServerInfo, SmtpError};
use crate::registry::LibraryUnit;
use crate::value::{arg, result, ErrorValue, IntoValue, Value};
use crate::wrapper::{InterfaceDescriptor, InterfaceWrapper};

pub const UNIT_ID: &str = "net/smtp";

/// Library API version these bindings were generated against
pub const GENERATED_FOR: &str = "0.1";

pub const AUTH: &str = "net/smtp.Auth";
pub const CLIENT: &str = "net/smtp.Client";
pub const SERVER_INFO: &str = "net/smtp.ServerInfo";
pub const CONN: &str = "net.Conn";

// =============================================================================
// Object Payloads
// =============================================================================

/// Payload of `net/smtp.Auth` values.
///
/// Holds a compiled mechanism, or an interpreter-built wrapper together with
/// the compiled view of it.
#[derive(Clone)]
pub struct AuthHandle {
    auth: Arc<dyn Auth>,
    wrapper: Option<InterfaceWrapper>,
}

impl AuthHandle {
    pub fn compiled(auth: impl Auth + 'static) -> Self {
        Self {
            auth: Arc::new(auth),
            wrapper: None,
        }
    }

    fn wrapped(wrapper: InterfaceWrapper) -> Self {
        Self {
            auth: Arc::new(WrappedAuth(wrapper.clone())),
            wrapper: Some(wrapper),
        }
    }

    /// The mechanism as compiled code sees it
    pub fn auth(&self) -> &dyn Auth {
        self.auth.as_ref()
    }

    pub fn is_wrapper(&self) -> bool {
        self.wrapper.is_some()
    }
}

impl IntoValue for AuthHandle {
    fn into_value(self) -> Value {
        Value::object(AUTH, self)
    }
}

/// Payload of `net/smtp.Client` values.
///
/// Other threads wait for the session; a call re-entering it from an `Auth`
/// closure on the locking thread fails with [`BridgeError::ObjectBusy`].
pub struct ClientHandle(ReentrantMutex<RefCell<Client>>);

/// Payload of `net.Conn` values; `NewClient` takes the connection out
pub struct ConnHandle(Mutex<Option<Box<dyn Conn>>>);

/// Hand a host connection to interpreted code as a `net.Conn` value
pub fn conn_value(conn: impl Conn + 'static) -> Value {
    Value::object(CONN, ConnHandle(Mutex::new(Some(Box::new(conn)))))
}

fn client_value(client: Client) -> Value {
    Value::object(CLIENT, ClientHandle(ReentrantMutex::new(RefCell::new(client))))
}

fn receiver<'a, T: Any>(args: &'a [Value], ty: &str) -> BridgeResult<&'a T> {
    args.first()
        .ok_or_else(|| BridgeError::ArgCount {
            context: format!("{} receiver", ty),
            expected: 1,
            got: 0,
        })?
        .downcast_object::<T>(ty)
}

fn auth_arg<'a>(args: &'a [Value], index: usize) -> BridgeResult<Option<&'a AuthHandle>> {
    match args.get(index) {
        None | Some(Value::Nil) => Ok(None),
        Some(value) => value.downcast_object::<AuthHandle>(AUTH).map(Some),
    }
}

// =============================================================================
// Interface Wrapper
// =============================================================================

/// `_net_smtp_Auth`: forwards `mail::Auth` calls to interpreter closures
struct WrappedAuth(InterfaceWrapper);

fn external(err: BridgeError) -> SmtpError {
    SmtpError::External(Box::new(err))
}

fn returned_error(value: Option<ErrorValue>) -> Result<(), SmtpError> {
    match value {
        Some(err) => Err(SmtpError::External(Box::new(err))),
        None => Ok(()),
    }
}

impl Auth for WrappedAuth {
    fn start(&self, server: &ServerInfo) -> Result<(String, Option<Vec<u8>>), SmtpError> {
        let out = self
            .0
            .invoke("Start", &[Value::object(SERVER_INFO, server.clone())])
            .map_err(external)?;
        returned_error(result(&out, 2, "net/smtp.Auth.Start").map_err(external)?)?;
        let proto: String = result(&out, 0, "net/smtp.Auth.Start").map_err(external)?;
        let to_server: Option<Vec<u8>> =
            result(&out, 1, "net/smtp.Auth.Start").map_err(external)?;
        Ok((proto, to_server))
    }

    fn next(&self, from_server: &[u8], more: bool) -> Result<Option<Vec<u8>>, SmtpError> {
        let out = self
            .0
            .invoke("Next", &[Value::Bytes(from_server.to_vec()), Value::Bool(more)])
            .map_err(external)?;
        returned_error(result(&out, 1, "net/smtp.Auth.Next").map_err(external)?)?;
        result(&out, 0, "net/smtp.Auth.Next").map_err(external)
    }
}

// =============================================================================
// Types
// =============================================================================

fn start_signature() -> FuncSignature {
    FuncSignature::new(
        vec![TypeRef::named(SERVER_INFO)],
        vec![TypeRef::String, TypeRef::Bytes, TypeRef::Error],
    )
}

fn next_signature() -> FuncSignature {
    FuncSignature::new(
        vec![TypeRef::Bytes, TypeRef::Bool],
        vec![TypeRef::Bytes, TypeRef::Error],
    )
}

fn auth_interface() -> Arc<InterfaceDescriptor> {
    Arc::new(
        InterfaceDescriptor::new(AUTH)
            .method("Start", start_signature())
            .method("Next", next_signature()),
    )
}

/// `Auth` methods callable from interpreted code. Wrapper values forward
/// straight to their closures.
fn auth_type() -> TypeDescriptor {
    TypeDescriptor::interface(auth_interface())
        .with_method("Start", start_signature(), |args| {
            let handle = receiver::<AuthHandle>(args, AUTH)?;
            if let Some(wrapper) = &handle.wrapper {
                return wrapper.invoke("Start", &args[1..]);
            }
            let server = args[1].downcast_object::<ServerInfo>(SERVER_INFO)?;
            Ok(match handle.auth.start(server) {
                Ok((proto, to_server)) => {
                    vec![Value::Str(proto), to_server.into_value(), Value::Nil]
                }
                Err(e) => vec![Value::Str(String::new()), Value::Nil, Value::error(e)],
            })
        })
        .with_method("Next", next_signature(), |args| {
            let handle = receiver::<AuthHandle>(args, AUTH)?;
            if let Some(wrapper) = &handle.wrapper {
                return wrapper.invoke("Next", &args[1..]);
            }
            let from_server: Vec<u8> = arg(args, 1, "net/smtp.Auth.Next")?;
            let more: bool = arg(args, 2, "net/smtp.Auth.Next")?;
            Ok(Value::pair(handle.auth.next(&from_server, more)))
        })
}

fn server_info_type() -> TypeDescriptor {
    TypeDescriptor::structure(SERVER_INFO)
        .with_field("Name", TypeRef::String, |recv| {
            Ok(recv.downcast_object::<ServerInfo>(SERVER_INFO)?.name.clone().into_value())
        })
        .with_field("TLS", TypeRef::Bool, |recv| {
            Ok(Value::Bool(recv.downcast_object::<ServerInfo>(SERVER_INFO)?.tls))
        })
        .with_field("Auth", TypeRef::list(TypeRef::String), |recv| {
            Ok(recv.downcast_object::<ServerInfo>(SERVER_INFO)?.auth.clone().into_value())
        })
        .with_constructor(
            FuncSignature::new(
                vec![TypeRef::String, TypeRef::Bool, TypeRef::list(TypeRef::String)],
                vec![TypeRef::named(SERVER_INFO)],
            ),
            |args| {
                let info = ServerInfo {
                    name: arg(args, 0, SERVER_INFO)?,
                    tls: arg(args, 1, SERVER_INFO)?,
                    auth: arg(args, 2, SERVER_INFO)?,
                };
                Ok(Value::object(SERVER_INFO, info))
            },
        )
}

/// Run `f` on the locked client session in `args[0]`
fn with_client<F>(args: &[Value], method: &str, f: F) -> BridgeResult<Vec<Value>>
where
    F: FnOnce(&mut Client, &[Value]) -> BridgeResult<Vec<Value>>,
{
    let handle = receiver::<ClientHandle>(args, CLIENT)?;
    let session = handle.0.lock();
    let mut client = session.try_borrow_mut().map_err(|_| BridgeError::ObjectBusy {
        object: CLIENT.to_string(),
        method: method.to_string(),
    })?;
    f(&mut client, &args[1..])
}

fn client_type() -> TypeDescriptor {
    let status = |params: Vec<TypeRef>| FuncSignature::new(params, vec![TypeRef::Error]);

    TypeDescriptor::structure(CLIENT)
        .with_method("Auth", status(vec![TypeRef::named(AUTH)]), |args| {
            let handle = auth_arg(args, 1)?
                .ok_or_else(|| BridgeError::mismatch("net/smtp.Client.Auth argument 0", AUTH, "nil"))?;
            with_client(args, "Auth", |c, _| Ok(vec![Value::status(c.auth(handle.auth()))]))
        })
        .with_method("Close", status(vec![]), |args| {
            with_client(args, "Close", |c, _| Ok(vec![Value::status(c.close())]))
        })
        .with_method("Data", status(vec![TypeRef::Bytes]), |args| {
            with_client(args, "Data", |c, rest| {
                let body: Vec<u8> = arg(rest, 0, "net/smtp.Client.Data")?;
                Ok(vec![Value::status(c.data(&body))])
            })
        })
        .with_method(
            "Extension",
            FuncSignature::new(vec![TypeRef::String], vec![TypeRef::Bool, TypeRef::String]),
            |args| {
                with_client(args, "Extension", |c, rest| {
                    let ext: String = arg(rest, 0, "net/smtp.Client.Extension")?;
                    // No error slot: a failed EHLO reads as unsupported
                    let params = c.extension(&ext).unwrap_or(None);
                    Ok(vec![
                        Value::Bool(params.is_some()),
                        Value::Str(params.unwrap_or_default()),
                    ])
                })
            },
        )
        .with_method("Hello", status(vec![TypeRef::String]), |args| {
            with_client(args, "Hello", |c, rest| {
                let local_name: String = arg(rest, 0, "net/smtp.Client.Hello")?;
                Ok(vec![Value::status(c.hello(&local_name))])
            })
        })
        .with_method("Mail", status(vec![TypeRef::String]), |args| {
            with_client(args, "Mail", |c, rest| {
                let from: String = arg(rest, 0, "net/smtp.Client.Mail")?;
                Ok(vec![Value::status(c.mail(&from))])
            })
        })
        .with_method("Noop", status(vec![]), |args| {
            with_client(args, "Noop", |c, _| Ok(vec![Value::status(c.noop())]))
        })
        .with_method("Quit", status(vec![]), |args| {
            with_client(args, "Quit", |c, _| Ok(vec![Value::status(c.quit())]))
        })
        .with_method("Rcpt", status(vec![TypeRef::String]), |args| {
            with_client(args, "Rcpt", |c, rest| {
                let to: String = arg(rest, 0, "net/smtp.Client.Rcpt")?;
                Ok(vec![Value::status(c.rcpt(&to))])
            })
        })
        .with_method("Reset", status(vec![]), |args| {
            with_client(args, "Reset", |c, _| Ok(vec![Value::status(c.reset())]))
        })
        .with_method("Verify", status(vec![TypeRef::String]), |args| {
            with_client(args, "Verify", |c, rest| {
                let addr: String = arg(rest, 0, "net/smtp.Client.Verify")?;
                Ok(vec![Value::status(c.verify(&addr))])
            })
        })
}

// =============================================================================
// Unit
// =============================================================================

/// Build the `net/smtp` unit
pub fn unit() -> BridgeResult<LibraryUnit> {
    let client_result = || vec![TypeRef::named(CLIENT), TypeRef::Error];

    LibraryUnit::builder(UNIT_ID)
        .version(GENERATED_FOR)
        .function(
            "CRAMMD5Auth",
            FuncSignature::new(vec![TypeRef::String, TypeRef::String], vec![TypeRef::named(AUTH)]),
            |args| {
                let username: String = arg(args, 0, "net/smtp.CRAMMD5Auth")?;
                let secret: String = arg(args, 1, "net/smtp.CRAMMD5Auth")?;
                let auth = mail::cram_md5_auth(&username, &secret);
                Ok(vec![AuthHandle::compiled(auth).into_value()])
            },
        )
        .function(
            "Dial",
            FuncSignature::new(vec![TypeRef::String], client_result()),
            |args| {
                let addr: String = arg(args, 0, "net/smtp.Dial")?;
                Ok(Value::pair(mail::dial(&addr).map(client_value)))
            },
        )
        .function(
            "NewClient",
            FuncSignature::new(vec![TypeRef::named(CONN), TypeRef::String], client_result()),
            |args| {
                let conn = args[0].downcast_object::<ConnHandle>(CONN)?.0.lock().take();
                let host: String = arg(args, 1, "net/smtp.NewClient")?;
                let res = match conn {
                    Some(conn) => Client::new(conn, &host),
                    None => Err(SmtpError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "connection already owned by a client",
                    ))),
                };
                Ok(Value::pair(res.map(client_value)))
            },
        )
        .function(
            "PlainAuth",
            FuncSignature::new(
                vec![TypeRef::String, TypeRef::String, TypeRef::String, TypeRef::String],
                vec![TypeRef::named(AUTH)],
            ),
            |args| {
                let identity: String = arg(args, 0, "net/smtp.PlainAuth")?;
                let username: String = arg(args, 1, "net/smtp.PlainAuth")?;
                let password: String = arg(args, 2, "net/smtp.PlainAuth")?;
                let host: String = arg(args, 3, "net/smtp.PlainAuth")?;
                let auth = mail::plain_auth(&identity, &username, &password, &host);
                Ok(vec![AuthHandle::compiled(auth).into_value()])
            },
        )
        .function(
            "SendMail",
            FuncSignature::new(
                vec![
                    TypeRef::String,
                    TypeRef::named(AUTH),
                    TypeRef::String,
                    TypeRef::list(TypeRef::String),
                    TypeRef::Bytes,
                ],
                vec![TypeRef::Error],
            ),
            |args| {
                let addr: String = arg(args, 0, "net/smtp.SendMail")?;
                let auth = auth_arg(args, 1)?;
                let from: String = arg(args, 2, "net/smtp.SendMail")?;
                let to: Vec<String> = arg(args, 3, "net/smtp.SendMail")?;
                let msg: Vec<u8> = arg(args, 4, "net/smtp.SendMail")?;
                let res = mail::send_mail(&addr, auth.map(AuthHandle::auth), &from, &to, &msg);
                Ok(vec![Value::status(res)])
            },
        )
        .interface(auth_type(), |wrapper| AuthHandle::wrapped(wrapper).into_value())
        .type_def(client_type())
        .type_def(server_info_type())
        .build()
}
