#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    account_auth_service::rocket()
}
