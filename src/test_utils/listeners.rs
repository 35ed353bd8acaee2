use std::sync::Mutex;

use crate::rpc::CommandNotifyListener;
use crate::rpc::CommandType;
use crate::rpc::NotifyListener;
use crate::rpc::Url;

/// Records every service notification it receives.
pub struct RecordingListener {
    id: String,
    notifications: Mutex<Vec<(Url, Vec<Url>)>>,
}

impl RecordingListener {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn notifications(&self) -> Vec<(Url, Vec<Url>)> {
        self.notifications.lock().expect("notifications lock poisoned").clone()
    }

    pub fn notified(&self) -> bool {
        !self.notifications.lock().expect("notifications lock poisoned").is_empty()
    }
}

impl NotifyListener for RecordingListener {
    fn identity(&self) -> String {
        self.id.clone()
    }

    fn notify(
        &self,
        registry_url: &Url,
        urls: Vec<Url>,
    ) {
        self.notifications
            .lock()
            .expect("notifications lock poisoned")
            .push((registry_url.clone(), urls));
    }
}

/// Records every command notification it receives.
pub struct RecordingCommandListener {
    id: String,
    commands: Mutex<Vec<(Url, CommandType, String)>>,
}

impl RecordingCommandListener {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<(Url, CommandType, String)> {
        self.commands.lock().expect("commands lock poisoned").clone()
    }

    pub fn last_command(&self) -> Option<String> {
        self.commands
            .lock()
            .expect("commands lock poisoned")
            .last()
            .map(|(_, _, command)| command.clone())
    }
}

impl CommandNotifyListener for RecordingCommandListener {
    fn identity(&self) -> String {
        self.id.clone()
    }

    fn notify_command(
        &self,
        registry_url: &Url,
        kind: CommandType,
        command: String,
    ) {
        self.commands
            .lock()
            .expect("commands lock poisoned")
            .push((registry_url.clone(), kind, command));
    }
}
