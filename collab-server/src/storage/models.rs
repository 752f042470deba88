use crate::storage::schema::{content, messages, rewards, settings, users};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: String,
    pub points: i64,
    pub email: Option<String>,
    pub created_at: NaiveDateTime,
    pub last_active_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub role: &'a str,
    pub points: i64,
    pub email: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub last_active_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = content)]
pub struct Content {
    pub id: String,
    pub kind: String,
    pub body: String,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub language: Option<String>,
    pub sender_name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = content)]
pub struct NewContent {
    pub id: String,
    pub kind: String,
    pub body: String,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub language: Option<String>,
    pub sender_name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub room: String,
    pub text: String,
    pub sender_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub room: &'a str,
    pub text: &'a str,
    pub sender_name: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub rewarder_name: &'a str,
    pub sender_name: &'a str,
    pub content_id: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = settings)]
pub struct NewSetting<'a> {
    pub id: &'a str,
    pub value: &'a str,
    pub updated_at: NaiveDateTime,
}
