#![allow(dead_code)]

mod sfo_fixture;

pub use sfo_fixture::build_sfo;

use appmeta_tool::{format, ftp::RemoteTarget};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

#[derive(Default)]
pub struct State {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub sessions: usize,
    pub retrievals: usize,
    pub commands: Vec<String>,
    pub refuse_login: bool,
    pub offline: bool,
}

/// A single-directory-tree FTP server speaking just enough of the protocol for the client.
pub struct FakeFtpServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl FakeFtpServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let shared = state.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = shared.clone();
                thread::spawn(move || {
                    let _ = handle(stream, state);
                });
            }
        });

        Self { addr, state }
    }

    pub fn target(&self) -> RemoteTarget {
        let mut target = RemoteTarget::new("127.0.0.1");
        target.port = self.addr.port();
        target.timeout = Some(Duration::from_secs(5));
        target
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn put_file(&self, path: &str, bytes: Vec<u8>) {
        self.state().files.insert(path.to_owned(), bytes);
    }

    pub fn add_dir(&self, path: &str) {
        self.state().dirs.insert(path.trim_end_matches('/').to_owned());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn retrievals(&self) -> usize {
        self.state().retrievals
    }

    pub fn sessions(&self) -> usize {
        self.state().sessions
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }
}

fn reply(out: &mut TcpStream, line: &str) -> io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")
}

fn parent_and_name(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_end_matches('/');
    let split = path.rfind('/')?;
    Some((&path[..split], &path[split + 1..]))
}

fn listing(state: &State, dir: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let mut dirs = BTreeSet::new();
    let mut files = BTreeMap::new();

    for path in state.dirs.iter() {
        if let Some((parent, name)) = parent_and_name(path) {
            if parent == dir {
                dirs.insert(name.to_owned());
            }
        }
    }
    for (path, bytes) in state.files.iter() {
        let Some(rest) = path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) else {
            continue;
        };
        match rest.split_once('/') {
            Some((sub, _)) => {
                dirs.insert(sub.to_owned());
            }
            None => {
                files.insert(rest.to_owned(), bytes.len());
            }
        }
    }

    let mut out = format!("total {}\r\n", dirs.len() + files.len());
    for name in dirs {
        out.push_str(&format!(
            "drwxrwxrwx   1 root  wheel      512 Jan 01  2020 {}\r\n",
            name
        ));
    }
    for (name, len) in files {
        out.push_str(&format!(
            "-rw-rw-rw-   1 root  wheel {:>8} Jan 01  2020 {}\r\n",
            len, name
        ));
    }
    out
}

fn handle(stream: TcpStream, state: Arc<Mutex<State>>) -> io::Result<()> {
    {
        let mut state = state.lock().unwrap();
        if state.offline {
            return Ok(());
        }
        state.sessions += 1;
    }

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let mut passive: Option<TcpListener> = None;

    reply(&mut out, "220 fake ftp ready")?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_owned();
        let (command, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        state.lock().unwrap().commands.push(line.clone());

        match command {
            "USER" => reply(&mut out, "331 anonymous login ok, send password")?,
            "PASS" => {
                if state.lock().unwrap().refuse_login {
                    reply(&mut out, "530 login incorrect")?;
                } else {
                    reply(&mut out, "230 user logged in")?;
                }
            }
            "TYPE" => reply(&mut out, "200 type set")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let [hi, lo] = listener.local_addr()?.port().to_be_bytes();
                passive = Some(listener);
                reply(
                    &mut out,
                    &format!("227 Entering Passive Mode (127,0,0,1,{},{})", hi, lo),
                )?;
            }
            "LIST" => {
                let Some(listener) = passive.take() else {
                    reply(&mut out, "425 use PASV first")?;
                    continue;
                };
                let text = listing(&state.lock().unwrap(), arg);
                reply(&mut out, "150 opening data connection")?;
                let (mut data, _) = listener.accept()?;
                data.write_all(text.as_bytes())?;
                drop(data);
                reply(&mut out, "226 transfer complete")?;
            }
            "RETR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut out, "425 use PASV first")?;
                    continue;
                };
                let bytes = {
                    let mut state = state.lock().unwrap();
                    let bytes = state.files.get(arg).cloned();
                    if bytes.is_some() {
                        state.retrievals += 1;
                    }
                    bytes
                };
                let Some(bytes) = bytes else {
                    reply(&mut out, "550 file not found")?;
                    continue;
                };
                reply(&mut out, "150 opening data connection")?;
                let (mut data, _) = listener.accept()?;
                data.write_all(&bytes)?;
                drop(data);
                reply(&mut out, "226 transfer complete")?;
            }
            "STOR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut out, "425 use PASV first")?;
                    continue;
                };
                reply(&mut out, "150 opening data connection")?;
                let (mut data, _) = listener.accept()?;
                let mut bytes = Vec::new();
                data.read_to_end(&mut bytes)?;
                state.lock().unwrap().files.insert(arg.to_owned(), bytes);
                reply(&mut out, "226 transfer complete")?;
            }
            "DELE" => {
                if state.lock().unwrap().files.remove(arg).is_some() {
                    reply(&mut out, "250 file deleted")?;
                } else {
                    reply(&mut out, "550 file not found")?;
                }
            }
            "QUIT" => {
                reply(&mut out, "221 goodbye")?;
                return Ok(());
            }
            _ => reply(&mut out, "502 command not implemented")?,
        }
    }
}
