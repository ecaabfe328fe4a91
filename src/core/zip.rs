//! 合并比较：把两个按名称排序的文件流按名称配对

use crate::core::file::File;
use crate::core::folder::{FileStream, Folder};
use crate::error::Result;
use futures::{Stream, StreamExt};
use std::cmp::Ordering;
use std::pin::Pin;

/// 一对同名文件，至多一边缺失
pub type FilePair = (Option<File>, Option<File>);

/// 文件对流
pub type PairStream = Pin<Box<dyn Stream<Item = Result<FilePair>> + Send>>;

struct ZipState {
    iter_a: FileStream,
    iter_b: FileStream,
    current_a: Option<File>,
    current_b: Option<File>,
    /// 上一次产出消耗了当前元素，下次需要前进
    advance_a: bool,
    advance_b: bool,
}

impl ZipState {
    async fn refill(&mut self) -> Result<()> {
        if self.advance_a {
            self.current_a = self.iter_a.next().await.transpose()?;
            self.advance_a = false;
        }
        if self.advance_b {
            self.current_b = self.iter_b.next().await.transpose()?;
            self.advance_b = false;
        }
        Ok(())
    }

    fn next_pair(&mut self) -> Option<FilePair> {
        let pair = match (self.current_a.take(), self.current_b.take()) {
            (None, None) => return None,
            (Some(a), None) => {
                self.advance_a = true;
                (Some(a), None)
            }
            (None, Some(b)) => {
                self.advance_b = true;
                (None, Some(b))
            }
            (Some(a), Some(b)) => match a.name.cmp(&b.name) {
                Ordering::Less => {
                    self.current_b = Some(b);
                    self.advance_a = true;
                    (Some(a), None)
                }
                Ordering::Greater => {
                    self.current_a = Some(a);
                    self.advance_b = true;
                    (None, Some(b))
                }
                Ordering::Equal => {
                    self.advance_a = true;
                    self.advance_b = true;
                    (Some(a), Some(b))
                }
            },
        };
        Some(pair)
    }
}

/// 按名称合并两个已排序的文件流
///
/// 两个输入必须使用相同的排序规则，否则配对结果是错的（不做运行时检查）。
/// 任一输入出错时产出该错误并结束。
pub fn zip_files(iter_a: FileStream, iter_b: FileStream) -> PairStream {
    let state = ZipState {
        iter_a,
        iter_b,
        current_a: None,
        current_b: None,
        advance_a: true,
        advance_b: true,
    };

    futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if let Err(e) = state.refill().await {
            return Some((Err(e), None));
        }
        let pair = state.next_pair()?;
        Some((Ok(pair), Some(state)))
    })
    .boxed()
}

/// 两个文件夹中所有文件的并集，按名称配对
pub async fn zip_folders(folder_a: &dyn Folder, folder_b: &dyn Folder) -> Result<PairStream> {
    let iter_a = folder_a.all_files().await?;
    let iter_b = folder_b.all_files().await?;
    Ok(zip_files(iter_a, iter_b))
}
