//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use zonerun::Arg;
use zonerun::Callback;
use zonerun::ClassObject;
use zonerun::MethodResult;
use zonerun::Reply;
use zonerun::Runtime;
use zonerun::app_error;
use zonerun::callback;
use zonerun::transport::Inbox;
use zonerun::transport::pair;
use zonerun::zonewire::ObjectRef;
use zonerun::zonewire::Zone;

zonerun::distributed_object! {
    /// A player as both zones see it.
    pub struct User as "User" {
        gamertag as "gamertag": String => set_gamertag,
        score as "score": i64 => set_score,
        rival as "rival": Option<ObjectRef> => set_rival,
    }
    methods {
        "setGamertag" => change_gamertag,
        "getRival" => rival_object,
        "getGamertag" => read_gamertag,
        "addScore" => add_score,
    }
}

impl User {
    fn change_gamertag(&self, rt: &Runtime, args: Vec<Arg>) -> MethodResult {
        let name = args
            .first()
            .and_then(Arg::as_str)
            .ok_or_else(|| app_error(400, "gamertag must be a string"))?;
        self.set_gamertag(name.to_string());
        rt.queue_object_for_sync(self);
        Ok(Arg::null())
    }

    fn rival_object(&self, rt: &Runtime, _args: Vec<Arg>) -> MethodResult {
        let rival = self
            .rival()
            .and_then(|r| rt.session().resolve(&r))
            .ok_or_else(|| app_error(404, "no rival"))?;
        Ok(Arg::Object(rival))
    }

    fn read_gamertag(&self, _rt: &Runtime, _args: Vec<Arg>) -> MethodResult {
        Ok(Arg::from(self.gamertag()))
    }

    fn add_score(&self, rt: &Runtime, args: Vec<Arg>) -> MethodResult {
        let delta = args
            .first()
            .and_then(Arg::as_value)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| app_error(400, "delta must be an integer"))?;
        self.set_score(self.score() + delta);
        rt.queue_object_for_sync(self);
        Ok(Arg::from(self.score()))
    }
}

/// Static methods over every cached user. Calls back through any callback
/// argument with the number of users it touched.
pub struct Leaderboard;

impl ClassObject for Leaderboard {
    fn invoke(&self, rt: &Runtime, method: &str, args: Vec<Arg>) -> Option<MethodResult> {
        match method {
            "resetAll" => {
                let users = rt.session().cache().of_type("User");
                for user in &users {
                    if let Ok(user) = user.clone().as_any().downcast::<User>() {
                        user.set_score(0);
                        rt.queue_object_for_sync(user.as_ref());
                    }
                }
                if let Some(notify) = args.first().and_then(Arg::as_callback) {
                    notify(Reply::ok(users.len() as u64));
                }
                Some(Ok(Arg::from(users.len() as i64)))
            }
            "top" => {
                let mut users: Vec<Arc<User>> = rt
                    .session()
                    .cache()
                    .of_type("User")
                    .into_iter()
                    .filter_map(|u| u.as_any().downcast::<User>().ok())
                    .collect();
                users.sort_by_key(|u| std::cmp::Reverse(u.score()));
                Some(Ok(Arg::List(users.into_iter().map(Arg::from).collect())))
            }
            "fail" => Some(Err(app_error(500, "leaderboard offline"))),
            _ => None,
        }
    }
}

/// A public and a privileged runtime joined by an in-process channel.
pub struct Zones {
    pub public: Arc<Runtime>,
    pub privileged: Arc<Runtime>,
    public_inbox: Inbox,
    privileged_inbox: Inbox,
}

impl Zones {
    pub fn new() -> Self {
        let (public_end, privileged_end) = pair();
        let public = Runtime::builder(Zone::Public)
            .transport(public_end.transport)
            .register_type::<User>()
            .build()
            .expect("public runtime");
        let privileged = Runtime::builder(Zone::Privileged)
            .transport(privileged_end.transport)
            .register_type::<User>()
            .register_class("Leaderboard", Leaderboard)
            .build()
            .expect("privileged runtime");

        Self {
            public,
            privileged,
            public_inbox: public_end.inbox,
            privileged_inbox: privileged_end.inbox,
        }
    }

    /// Delivers messages in both directions until neither side has any left.
    pub fn settle(&mut self) -> usize {
        let mut total = 0;
        loop {
            let delivered = self.privileged_inbox.drain(&self.privileged)
                + self.public_inbox.drain(&self.public);
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }
}

/// A callback that records every reply it receives.
pub fn recording() -> (Callback, Arc<Mutex<Vec<Reply>>>) {
    let replies = Arc::new(Mutex::new(Vec::new()));
    let r = replies.clone();
    (callback(move |reply| r.lock().unwrap().push(reply)), replies)
}
