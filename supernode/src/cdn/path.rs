use crate::config::DOWNLOAD_HOME;

const META_SUFFIX: &str = ".meta";
const MD5_SUFFIX: &str = ".md5";

// Key of the framed blob inside the download bucket, "{id[0:3]}/{id}".
pub fn download_key(task_id: &str) -> String {
    let prefix: String = task_id.chars().take(3).collect();
    format!("{}/{}", prefix, task_id)
}

pub fn meta_key(task_id: &str) -> String {
    format!("{}{}", download_key(task_id), META_SUFFIX)
}

pub fn md5_key(task_id: &str) -> String {
    format!("{}{}", download_key(task_id), MD5_SUFFIX)
}

// Parent directory of the task files inside the bucket.
pub fn parent_key(task_id: &str) -> String {
    task_id.chars().take(3).collect()
}

// Url path peers pull the blob from on the download server.
pub fn http_path(task_id: &str) -> String {
    format!("/{}/{}", DOWNLOAD_HOME, download_key(task_id))
}

// Task id a file in the download bucket belongs to.
pub fn task_id_of(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next()?;
    let id = name.split('.').next()?;
    if id.is_empty() {
        return None;
    }
    Some(id)
}
